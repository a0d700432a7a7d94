//! Batching transformers and the batch policy contract.

use async_trait::async_trait;

use super::{Transform, Transformer};
use crate::stream::{Emitter, Flow};

/// Policy deciding when accumulated items are flushed as one group.
///
/// The batch stage adds every input item, commits whenever the policy
/// reports full, and commits a non-empty remainder once the input ends.
/// An empty policy is never committed.
///
/// # Examples
///
/// ```rust
/// use rivulet::transformers::Batch;
///
/// /// Groups words until their total length reaches a budget
/// struct ByLength {
///     budget: usize,
///     words: Vec<String>,
/// }
///
/// impl Batch for ByLength {
///     type Item = String;
///     type Output = Vec<String>;
///
///     fn is_full(&self) -> bool {
///         self.words.iter().map(String::len).sum::<usize>() >= self.budget
///     }
///
///     fn is_empty(&self) -> bool {
///         self.words.is_empty()
///     }
///
///     fn add(&mut self, word: String) {
///         self.words.push(word);
///     }
///
///     fn commit(&mut self) -> Vec<String> {
///         std::mem::take(&mut self.words)
///     }
/// }
/// ```
pub trait Batch: Send + 'static {
    /// Items accumulated by the policy
    type Item: Send + 'static;
    /// The group emitted on commit
    type Output: Send + 'static;

    /// Whether the pending group must be flushed now
    fn is_full(&self) -> bool;

    /// Whether nothing is pending
    fn is_empty(&self) -> bool;

    /// Accumulate an item
    fn add(&mut self, item: Self::Item);

    /// Take the pending group and reset
    fn commit(&mut self) -> Self::Output;
}

/// Fixed-size batches
#[derive(Debug, Clone)]
pub struct SizedBatch<T> {
    size: usize,
    items: Vec<T>,
}

impl<T> SizedBatch<T> {
    /// Create a policy flushing every `size` items. A size of zero is
    /// treated as one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            items: Vec::with_capacity(size),
        }
    }
}

impl<T: Send + 'static> Batch for SizedBatch<T> {
    type Item = T;
    type Output = Vec<T>;

    fn is_full(&self) -> bool {
        self.items.len() >= self.size
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn add(&mut self, item: T) {
        self.items.push(item);
    }

    fn commit(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.size))
    }
}

/// A transformer driving a [`Batch`] policy
pub struct Batcher<B> {
    policy: B,
}

#[async_trait]
impl<B: Batch> Transformer for Batcher<B> {
    type Input = B::Item;
    type Output = B::Output;

    async fn apply(&mut self, item: B::Item, emitter: &Emitter<B::Output>) -> Flow {
        self.policy.add(item);
        if self.policy.is_full() {
            emitter.emit(self.policy.commit()).await?;
        }
        Ok(())
    }

    async fn finish(&mut self, emitter: &Emitter<B::Output>) -> Flow {
        if self.policy.is_empty() {
            return Ok(());
        }
        emitter.emit(self.policy.commit()).await
    }
}

/// Group items into vectors of exactly `size`, except a shorter final group
pub fn batch<T: Send + 'static>(size: usize) -> Transform<Batcher<SizedBatch<T>>> {
    batch_by(SizedBatch::new(size))
}

/// Group items according to a custom policy
pub fn batch_by<B: Batch>(policy: B) -> Transform<Batcher<B>> {
    Transform::new(Batcher { policy })
}

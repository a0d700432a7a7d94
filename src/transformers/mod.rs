//! One-input/one-output stages.
//!
//! A [`Transform`] stage owns a [`Transformer`] and runs it in a worker that
//! reads its input stream one item at a time. Before every read the worker
//! checks its context; once the context is cancelled, or the input ends, or
//! the transformer interrupts, the worker closes its output and returns.
//! A transformer that returns [`Interrupt::Done`] while its output is still
//! open ends the whole pipeline: the context the stage is attached to is
//! asked to close.
//!
//! ```rust
//! use rivulet::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ctx = Context::new();
//! let (mut writable, readable) = rivulet::stream::open(3);
//! for i in 1..=3 {
//!     writable.write(i).await;
//! }
//! writable.close().unwrap();
//!
//! let evens = transformers::filter(|x: &i32| x % 2 == 0)
//!     .attach(&ctx)
//!     .transform(readable)
//!     .unwrap();
//!
//! assert_eq!(evens.read_all().await, vec![2]);
//! # });
//! ```

mod batch;
mod builtin;

pub use batch::{batch, batch_by, Batch, Batcher, SizedBatch};
pub use builtin::{
    drop_if, each, filter, flatten, map, reduce, sort_by, take, take_while, try_map, DropIf,
    Each, Filter, Flatten, Map, Reduce, SortBy, Take, TakeWhile, TryMap,
};

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::stage::{next_item, Attachment, Next, ScopeGuard};
use crate::stream::{self, Emitter, Flow, Interrupt, Readable, Writable};

/// Per-item function of a transform stage.
///
/// `apply` is called once per input item and may emit any number of items.
/// Returning [`Interrupt::Done`](crate::stream::Interrupt::Done) ends the
/// stage as if its input had ended and closes the attached context; returning
/// [`Interrupt::Failed`](crate::stream::Interrupt::Failed) also fails the
/// attached context.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use rivulet::stream::{Emitter, Flow};
/// use rivulet::transformers::Transformer;
///
/// struct Repeat(usize);
///
/// #[async_trait]
/// impl Transformer for Repeat {
///     type Input = String;
///     type Output = String;
///
///     async fn apply(&mut self, item: String, emitter: &Emitter<String>) -> Flow {
///         for _ in 0..self.0 {
///             emitter.emit(item.clone()).await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transformer: Send + 'static {
    /// The type of items this stage reads
    type Input: Send + 'static;
    /// The type of items this stage emits
    type Output: Send + 'static;

    /// Handle one input item
    async fn apply(&mut self, item: Self::Input, emitter: &Emitter<Self::Output>) -> Flow;

    /// Called once the input ended, to flush any pending state
    async fn finish(&mut self, _emitter: &Emitter<Self::Output>) -> Flow {
        Ok(())
    }
}

/// A transform stage: a [`Transformer`] waiting to be attached and run
pub struct Transform<X> {
    transformer: X,
    attachment: Attachment,
}

impl<X: Transformer> Transform<X> {
    /// Create a stage around a transformer
    pub fn new(transformer: X) -> Self {
        Self {
            transformer,
            attachment: Attachment::default(),
        }
    }

    /// Attach the stage to a context
    pub fn attach(mut self, context: &Context) -> Self {
        self.attachment.set(context);
        self
    }

    /// Spawn the stage worker over `input` and return its output stream.
    ///
    /// The output has the same capacity as the input. Fails with
    /// [`Error::Detached`](crate::error::Error::Detached) if no context was
    /// attached.
    pub fn transform(self, input: Readable<X::Input>) -> Result<Readable<X::Output>> {
        let (attached, scope) = self.attachment.scope("transform")?;
        let (writable, readable) = stream::open(input.capacity());

        tokio::spawn(run(self.transformer, attached, scope, input, writable));

        Ok(readable)
    }
}

async fn run<X: Transformer>(
    mut transformer: X,
    attached: Context,
    scope: Context,
    mut input: Readable<X::Input>,
    writable: Writable<X::Output>,
) {
    let guard = ScopeGuard::new("transform", attached, scope.clone());
    let emitter = Emitter::new(scope.clone(), writable);

    match drive(&mut transformer, &scope, &mut input, &emitter).await {
        Ok(()) => {}
        // Done while the output still accepts items came from the transformer itself.
        Err(Interrupt::Done) if !emitter.is_stopped() => guard.terminate(),
        Err(interrupt) => guard.interrupted(interrupt),
    }

    let _ = emitter.into_inner().close();
}

async fn drive<X: Transformer>(
    transformer: &mut X,
    scope: &Context,
    input: &mut Readable<X::Input>,
    emitter: &Emitter<X::Output>,
) -> Flow {
    loop {
        match next_item(scope, input).await {
            Next::Item(item) => transformer.apply(item, emitter).await?,
            Next::End => return transformer.finish(emitter).await,
            Next::Cancelled => return Ok(()),
        }
    }
}

//! Positional pairing of several inputs.

use std::marker::PhantomData;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::context::Context;
use crate::error::Result;
use crate::stage::{Attachment, Next, ScopeGuard};
use crate::stream::{self, Emitter, Flow, Readable, Writable};

/// Emits one group per round, holding one item from every input in input
/// order. Ends as soon as any input ends.
pub struct Zip<T> {
    attachment: Attachment,
    _phantom: PhantomData<T>,
}

impl<T: Send + 'static> Zip<T> {
    /// Create a detached zip combiner
    pub fn new() -> Self {
        Self {
            attachment: Attachment::default(),
            _phantom: PhantomData,
        }
    }

    /// Attach the stage to a context
    pub fn attach(mut self, context: &Context) -> Self {
        self.attachment.set(context);
        self
    }

    /// Spawn the zipping worker and return the stream of rounds
    pub fn combine(self, inputs: Vec<Readable<T>>) -> Result<Readable<Vec<T>>> {
        let (attached, scope) = self.attachment.scope("zip")?;
        let (writable, readable) = stream::open(scope.config().buffer_size);

        tokio::spawn(run("zip", attached, scope, inputs, writable, Some));

        Ok(readable)
    }
}

impl<T: Send + 'static> Default for Zip<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Group items positionally, one from each input per round
pub fn zip<T: Send + 'static>() -> Zip<T> {
    Zip::new()
}

/// Reduces each round left-to-right with a binary function
pub struct ZipBy<F, T> {
    f: F,
    attachment: Attachment,
    _phantom: PhantomData<T>,
}

impl<F, T> ZipBy<F, T>
where
    F: FnMut(T, T) -> T + Send + 'static,
    T: Send + 'static,
{
    /// Create a detached combiner reducing rounds with `f`
    pub fn new(f: F) -> Self {
        Self {
            f,
            attachment: Attachment::default(),
            _phantom: PhantomData,
        }
    }

    /// Attach the stage to a context
    pub fn attach(mut self, context: &Context) -> Self {
        self.attachment.set(context);
        self
    }

    /// Spawn the zipping worker and return the stream of reduced rounds
    pub fn combine(self, inputs: Vec<Readable<T>>) -> Result<Readable<T>> {
        let (attached, scope) = self.attachment.scope("zip_by")?;
        let (writable, readable) = stream::open(scope.config().buffer_size);

        let mut f = self.f;
        let reduce = move |round: Vec<T>| round.into_iter().reduce(&mut f);
        tokio::spawn(run("zip_by", attached, scope, inputs, writable, reduce));

        Ok(readable)
    }
}

/// Reduce items positionally with `f`, one from each input per round
pub fn zip_by<F, T>(f: F) -> ZipBy<F, T>
where
    F: FnMut(T, T) -> T + Send + 'static,
    T: Send + 'static,
{
    ZipBy::new(f)
}

async fn run<T, O, C>(
    stage: &'static str,
    attached: Context,
    scope: Context,
    mut inputs: Vec<Readable<T>>,
    writable: Writable<O>,
    combine: C,
) where
    T: Send + 'static,
    O: Send + 'static,
    C: FnMut(Vec<T>) -> Option<O> + Send,
{
    let guard = ScopeGuard::new(stage, attached, scope.clone());
    let emitter = Emitter::new(scope.clone(), writable);

    if let Err(interrupt) = rounds(&scope, &mut inputs, &emitter, combine).await {
        guard.interrupted(interrupt);
    }

    let _ = emitter.into_inner().close();
}

async fn rounds<T, O, C>(
    scope: &Context,
    inputs: &mut [Readable<T>],
    emitter: &Emitter<O>,
    mut combine: C,
) -> Flow
where
    T: Send + 'static,
    O: Send + 'static,
    C: FnMut(Vec<T>) -> Option<O> + Send,
{
    if inputs.is_empty() {
        return Ok(());
    }

    loop {
        let round = match next_round(scope, inputs).await {
            Next::Item(round) => round,
            Next::End | Next::Cancelled => return Ok(()),
        };

        if let Some(output) = combine(round) {
            emitter.emit(output).await?;
        }
    }
}

/// Read one item from every input.
///
/// The reads run concurrently, and the round ends the stage as soon as any
/// input ends, even while other inputs are still idle. Items already read
/// for that round are dropped.
async fn next_round<T: Send + 'static>(
    scope: &Context,
    inputs: &mut [Readable<T>],
) -> Next<Vec<T>> {
    if scope.is_cancelled() {
        return Next::Cancelled;
    }

    let mut slots: Vec<Option<T>> = inputs.iter().map(|_| None).collect();
    let mut reads: FuturesUnordered<_> = inputs
        .iter_mut()
        .enumerate()
        .map(|(index, input)| async move { (index, input.read().await) })
        .collect();

    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => return Next::Cancelled,
            read = reads.next() => match read {
                Some((index, Some(item))) => slots[index] = Some(item),
                Some((_, None)) => return Next::End,
                None => break,
            },
        }
    }

    match slots.into_iter().collect::<Option<Vec<T>>>() {
        Some(round) => Next::Item(round),
        None => Next::End,
    }
}

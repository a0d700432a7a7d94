//! Unordered interleave of several inputs.

use std::marker::PhantomData;

use tokio::task::JoinSet;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::stage::{next_item, Attachment, Next, ScopeGuard};
use crate::stream::{self, Emitter, Flow, Readable, Writable};

/// Interleaves its inputs in arrival order.
///
/// Order within one input is preserved; across inputs it is not.
pub struct Fifo<T> {
    attachment: Attachment,
    _phantom: PhantomData<T>,
}

impl<T: Send + 'static> Fifo<T> {
    /// Create a detached FIFO combiner
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

    /// Spawn one forwarder per input and return the merged stream.
    ///
    /// The merged stream closes once every input has ended.
    pub fn combine(self, inputs: Vec<Readable<T>>) -> Result<Readable<T>> {
        let (attached, scope) = self.attachment.scope("fifo")?;
        let (writable, readable) = stream::open(scope.config().buffer_size);

        tokio::spawn(run(attached, scope, inputs, writable));

        Ok(readable)
    }
}

impl<T: Send + 'static> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge inputs in arrival order
pub fn fifo<T: Send + 'static>() -> Fifo<T> {
    Fifo::new()
}

async fn run<T: Send + 'static>(
    attached: Context,
    scope: Context,
    inputs: Vec<Readable<T>>,
    mut writable: Writable<T>,
) {
    let guard = ScopeGuard::new("fifo", attached, scope.clone());
    let mut forwarders = JoinSet::new();

    for input in inputs {
        if let Some(shared) = writable.share() {
            let emitter = Emitter::new(scope.clone(), shared);
            forwarders.spawn(forward(scope.clone(), input, emitter));
        }
    }

    let expected = forwarders.len();
    let mut ended = 0;
    while let Some(joined) = forwarders.join_next().await {
        ended += 1;
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(interrupt)) => guard.interrupted(interrupt),
            Err(error) if error.is_panic() => guard.interrupted(Error::Panicked.into()),
            Err(_) => {}
        }
    }
    tracing::trace!(ended, expected, "fifo inputs ended");

    let _ = writable.close();
}

async fn forward<T: Send + 'static>(
    scope: Context,
    mut input: Readable<T>,
    emitter: Emitter<T>,
) -> Flow {
    loop {
        match next_item(&scope, &mut input).await {
            Next::Item(item) => emitter.emit(item).await?,
            Next::End | Next::Cancelled => return Ok(()),
        }
    }
}

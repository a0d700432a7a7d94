//! Predicate-driven fan-out.

use std::marker::PhantomData;

use tokio::task::{JoinError, JoinSet};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::stage::{next_item, Attachment, Next, ScopeGuard};
use crate::stream::{self, Emitter, Flow, Readable, Writable};

/// Copies matching items to every output and passes the rest on.
///
/// Non-matching items keep their order on the remainder. Matching items are
/// delivered to each output by its own task; delivery order across items is
/// not kept. Outputs are closed once every delivery finished, or right
/// away if the context fails first, and the remainder is closed after them.
pub struct If<P, T> {
    predicate: P,
    attachment: Attachment,
    _phantom: PhantomData<T>,
}

impl<P, T> If<P, T>
where
    P: FnMut(&T) -> bool + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Create a detached dispatcher routing on `predicate`
    pub fn new(predicate: P) -> Self {
        Self {
            predicate,
            attachment: Attachment::default(),
            _phantom: PhantomData,
        }
    }

    /// Attach the stage to a context
    pub fn attach(mut self, context: &Context) -> Self {
        self.attachment.set(context);
        self
    }

    /// Spawn the dispatch worker and return the remainder stream.
    ///
    /// The stage takes ownership of `outputs` and closes them when it stops.
    /// The remainder has the same capacity as the input.
    pub fn dispatch(self, input: Readable<T>, outputs: Vec<Writable<T>>) -> Result<Readable<T>> {
        let (attached, scope) = self.attachment.scope("dispatch")?;
        let (remainder, readable) = stream::open(input.capacity());

        tokio::spawn(run(
            self.predicate,
            attached,
            scope,
            input,
            outputs,
            remainder,
        ));

        Ok(readable)
    }
}

/// Route items matching `predicate` to the dispatch outputs
pub fn dispatch_if<P, T>(predicate: P) -> If<P, T>
where
    P: FnMut(&T) -> bool + Send + 'static,
    T: Clone + Send + 'static,
{
    If::new(predicate)
}

async fn run<P, T>(
    mut predicate: P,
    attached: Context,
    scope: Context,
    mut input: Readable<T>,
    outputs: Vec<Writable<T>>,
    remainder: Writable<T>,
) where
    P: FnMut(&T) -> bool + Send + 'static,
    T: Clone + Send + 'static,
{
    let guard = ScopeGuard::new("dispatch", attached, scope.clone());
    let emitter = Emitter::new(scope.clone(), remainder);
    let mut deliveries = JoinSet::new();

    let flow = route(
        &mut predicate,
        &guard,
        &scope,
        &mut input,
        &emitter,
        &outputs,
        &mut deliveries,
    )
    .await;
    if let Err(interrupt) = flow {
        guard.interrupted(interrupt);
    }

    barrier(&guard, &scope, &mut deliveries).await;

    for mut output in outputs {
        let _ = output.close();
    }
    let _ = emitter.into_inner().close();
}

async fn route<P, T>(
    predicate: &mut P,
    guard: &ScopeGuard,
    scope: &Context,
    input: &mut Readable<T>,
    emitter: &Emitter<T>,
    outputs: &[Writable<T>],
    deliveries: &mut JoinSet<Flow>,
) -> Flow
where
    P: FnMut(&T) -> bool + Send + 'static,
    T: Clone + Send + 'static,
{
    loop {
        reap(guard, deliveries);

        let item = match next_item(scope, input).await {
            Next::Item(item) => item,
            Next::End | Next::Cancelled => return Ok(()),
        };

        if !predicate(&item) {
            emitter.emit(item).await?;
            continue;
        }

        for output in outputs {
            if let Some(shared) = output.share() {
                let delivery = Emitter::new(scope.clone(), shared);
                let item = item.clone();
                deliveries.spawn(async move { delivery.emit(item).await });
            }
        }
    }
}

/// Wait for every pending delivery, or abort them all once the context fails
async fn barrier(guard: &ScopeGuard, scope: &Context, deliveries: &mut JoinSet<Flow>) {
    loop {
        tokio::select! {
            biased;
            _ = scope.failed() => {
                tracing::debug!(pending = deliveries.len(), "dispatch aborting deliveries");
                deliveries.abort_all();
                return;
            }
            joined = deliveries.join_next() => match joined {
                None => return,
                Some(joined) => delivered(guard, joined),
            },
        }
    }
}

/// Collect every delivery that already finished, without waiting
fn reap(guard: &ScopeGuard, deliveries: &mut JoinSet<Flow>) {
    while let Some(joined) = deliveries.try_join_next() {
        delivered(guard, joined);
    }
}

fn delivered(guard: &ScopeGuard, joined: std::result::Result<Flow, JoinError>) {
    if let Err(error) = joined {
        if error.is_panic() {
            guard.interrupted(Error::Panicked.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::filled;
    use std::time::Duration;

    fn even(x: &i32) -> bool {
        x % 2 == 0
    }

    async fn exploding_delivery() -> Flow {
        panic!("delivery blew up")
    }

    #[tokio::test]
    async fn test_dispatch_splits_matches_from_remainder() {
        let ctx = Context::new();
        let input = filled(vec![1, 2, 3, 4, 5]).await;
        let (extra, extra_reader) = stream::open(5);

        let remainder = dispatch_if(even)
            .attach(&ctx)
            .dispatch(input, vec![extra])
            .unwrap();

        assert_eq!(remainder.read_all().await, vec![1, 3, 5]);

        let mut matched = extra_reader.read_all().await;
        matched.sort();
        assert_eq!(matched, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_dispatch_copies_matches_to_every_output() {
        let ctx = Context::new();
        let input = filled(vec![1, 2, 4]).await;
        let (first, first_reader) = stream::open(4);
        let (second, second_reader) = stream::open(4);

        let remainder = dispatch_if(even)
            .attach(&ctx)
            .dispatch(input, vec![first, second])
            .unwrap();

        assert_eq!(remainder.read_all().await, vec![1]);
        for reader in [first_reader, second_reader] {
            let mut matched = reader.read_all().await;
            matched.sort();
            assert_eq!(matched, vec![2, 4]);
        }
    }

    #[tokio::test]
    async fn test_slow_output_does_not_stall_remainder() {
        let ctx = Context::new();
        let input = filled(vec![2, 4, 6, 7]).await;
        // Room for one item and nobody reading it yet.
        let (slow, slow_reader) = stream::open(1);

        let mut remainder = dispatch_if(even)
            .attach(&ctx)
            .dispatch(input, vec![slow])
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), remainder.read())
            .await
            .expect("remainder should flow while the output is full");
        assert_eq!(first, Some(7));

        let mut matched = slow_reader.read_all().await;
        matched.sort();
        assert_eq!(matched, vec![2, 4, 6]);
        assert_eq!(remainder.read().await, None);
    }

    #[tokio::test]
    async fn test_dispatch_on_closed_context_emits_nothing() {
        let ctx = Context::new();
        let input = filled(vec![1, 2, 3]).await;
        let (extra, extra_reader) = stream::open(3);
        ctx.close();

        let remainder = dispatch_if(even)
            .attach(&ctx)
            .dispatch(input, vec![extra])
            .unwrap();

        assert!(remainder.read_all().await.is_empty());
        assert!(extra_reader.read_all().await.is_empty());
        ctx.closed().await;
    }

    #[tokio::test]
    async fn test_failure_aborts_pending_deliveries() {
        let ctx = Context::new();
        let input = filled(vec![2, 4, 6]).await;
        let (stuck, mut stuck_reader) = stream::open(1);

        let remainder = dispatch_if(even)
            .attach(&ctx)
            .dispatch(input, vec![stuck])
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.fail("downstream gave up");

        let items = tokio::time::timeout(Duration::from_secs(5), remainder.read_all())
            .await
            .expect("remainder should close once deliveries are aborted");
        assert!(items.is_empty());

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            let mut count = 0;
            while stuck_reader.read().await.is_some() {
                count += 1;
            }
            count
        })
        .await
        .expect("output should close once deliveries are aborted");
        assert!(drained <= 1);
        assert!(ctx.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_finished_deliveries_are_collected_while_routing() {
        let ctx = Context::new();
        let guard = ScopeGuard::new("test", ctx.clone(), ctx.derive_child());
        let mut deliveries = JoinSet::new();
        for _ in 0..3 {
            deliveries.spawn(async { Ok(()) });
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while !deliveries.is_empty() {
                tokio::task::yield_now().await;
                reap(&guard, &mut deliveries);
            }
        })
        .await
        .expect("finished deliveries should be collected");
        assert!(!ctx.is_failed());
    }

    #[tokio::test]
    async fn test_panicking_delivery_fails_context_before_input_ends() {
        let ctx = Context::new();
        let guard = ScopeGuard::new("test", ctx.clone(), ctx.derive_child());
        let mut deliveries = JoinSet::new();
        deliveries.spawn(exploding_delivery());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !ctx.is_failed() {
                tokio::task::yield_now().await;
                reap(&guard, &mut deliveries);
            }
        })
        .await
        .expect("a panicking delivery should fail the context");
        assert!(matches!(ctx.failure(), Some(Error::Panicked)));
    }

    #[tokio::test]
    async fn test_long_matching_input_is_delivered_in_full() {
        let ctx = Context::new();
        let (extra, extra_reader) = stream::open(16);
        let drain = tokio::spawn(extra_reader.read_all());

        let (mut writable, input) = stream::open(16);
        tokio::spawn(async move {
            for i in 0..2_000 {
                writable.write(i * 2).await;
            }
            let _ = writable.close();
        });

        let remainder = dispatch_if(even)
            .attach(&ctx)
            .dispatch(input, vec![extra])
            .unwrap();

        assert!(remainder.read_all().await.is_empty());
        assert_eq!(drain.await.unwrap().len(), 2_000);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_detached_dispatch_is_an_error() {
        let input = filled(vec![1]).await;
        let result = dispatch_if(even).dispatch(input, Vec::new());
        assert!(matches!(result, Err(Error::Detached)));
    }
}

//! Plumbing shared by every stage type.
//!
//! Stages are built with their per-item function, attached to a context, and
//! then invoked. Invocation derives a *scope* context for the stage's worker;
//! the scope is closed when the worker returns, so the attached context can
//! only finish closing once every worker under it has stopped.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::stream::{Interrupt, Readable};

/// Context slot filled by `attach`
#[derive(Debug, Clone, Default)]
pub(crate) struct Attachment(Option<Context>);

impl Attachment {
    pub(crate) fn set(&mut self, context: &Context) {
        self.0 = Some(context.clone());
    }

    /// Derive the worker scope, or report a detached stage
    pub(crate) fn scope(&self, stage: &'static str) -> Result<(Context, Context)> {
        match &self.0 {
            Some(context) => Ok((context.clone(), context.derive_child())),
            None => {
                tracing::warn!(stage, "stage invoked without an attached context");
                Err(Error::Detached)
            }
        }
    }
}

/// Closes a worker's scope when the worker returns or unwinds.
///
/// An unwinding worker also fails the attached context, so the rest of the
/// pipeline stops instead of waiting on it.
pub(crate) struct ScopeGuard {
    stage: &'static str,
    attached: Context,
    scope: Context,
}

impl ScopeGuard {
    pub(crate) fn new(stage: &'static str, attached: Context, scope: Context) -> Self {
        tracing::debug!(stage, scope = %scope.id(), "stage started");
        Self {
            stage,
            attached,
            scope,
        }
    }

    /// Record the outcome of an interrupted worker.
    ///
    /// `Done` here means the worker's output stopped accepting items, which
    /// only ends this stage.
    pub(crate) fn interrupted(&self, interrupt: Interrupt) {
        match interrupt {
            Interrupt::Done => {
                tracing::debug!(stage = self.stage, scope = %self.scope.id(), "stage output stopped")
            }
            Interrupt::Failed(cause) => self.attached.fail(cause),
        }
    }

    /// End the whole pipeline on behalf of a stage function that returned
    /// `Done` by itself
    pub(crate) fn terminate(&self) {
        tracing::debug!(stage = self.stage, scope = %self.scope.id(), "stage requested early termination");
        self.attached.close();
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.attached.fail(Error::Panicked);
        }
        self.scope.close();
        tracing::debug!(stage = self.stage, scope = %self.scope.id(), "stage stopped");
    }
}

/// What a worker got when it asked for the next input item
pub(crate) enum Next<T> {
    Item(T),
    End,
    Cancelled,
}

/// Read the next item unless the scope is cancelled.
///
/// The read races the cancellation signal, so a worker parked on an idle
/// input still stops once its context is cancelled.
pub(crate) async fn next_item<T: Send + 'static>(
    scope: &Context,
    input: &mut Readable<T>,
) -> Next<T> {
    if scope.is_cancelled() {
        return Next::Cancelled;
    }

    tokio::select! {
        biased;
        _ = scope.cancelled() => Next::Cancelled,
        item = input.read() => match item {
            Some(item) => Next::Item(item),
            None => Next::End,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_stage_is_an_error() {
        let attachment = Attachment::default();
        assert!(matches!(attachment.scope("test"), Err(Error::Detached)));
    }

    #[test]
    fn test_guard_closes_scope() {
        let ctx = Context::new();
        let mut attachment = Attachment::default();
        attachment.set(&ctx);

        let (attached, scope) = attachment.scope("test").unwrap();
        ctx.close();
        assert!(!ctx.is_closed());

        drop(ScopeGuard::new("test", attached, scope.clone()));
        assert!(scope.is_closed());
        assert!(ctx.is_closed());
    }

    #[test]
    fn test_guard_fails_context_on_unwind() {
        let ctx = Context::new();
        let scope = ctx.derive_child();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ScopeGuard::new("test", ctx.clone(), scope.clone());
            panic!("worker blew up");
        }));

        assert!(result.is_err());
        assert!(matches!(ctx.failure(), Some(Error::Panicked)));
        assert!(scope.is_closed());
    }

    #[tokio::test]
    async fn test_next_item_distinguishes_end_and_cancel() {
        let ctx = Context::new();
        let mut input = crate::stream::filled(vec![1]).await;

        assert!(matches!(next_item(&ctx, &mut input).await, Next::Item(1)));
        assert!(matches!(next_item(&ctx, &mut input).await, Next::End));

        let mut input = crate::stream::filled(vec![1]).await;
        ctx.close();
        assert!(matches!(next_item(&ctx, &mut input).await, Next::Cancelled));
    }

    #[test]
    fn test_terminate_closes_attached_context() {
        let ctx = Context::new();
        let sibling = ctx.derive_child();
        let guard = ScopeGuard::new("test", ctx.clone(), ctx.derive_child());

        guard.terminate();
        assert!(ctx.is_close_requested());
        assert!(sibling.is_cancelled());
        assert!(!ctx.is_failed());
    }

    #[test]
    fn test_done_interrupt_stays_local() {
        let ctx = Context::new();
        let guard = ScopeGuard::new("test", ctx.clone(), ctx.derive_child());

        guard.interrupted(Interrupt::Done);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_failed_interrupt_fails_attached_context() {
        let ctx = Context::new();
        let guard = ScopeGuard::new("test", ctx.clone(), ctx.derive_child());

        guard.interrupted(Interrupt::Failed(Error::custom("bad")));
        assert!(ctx.is_failed());
    }
}

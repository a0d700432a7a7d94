//! Guarded writes bound to a context.

use super::Writable;
use crate::context::Context;
use crate::error::Error;

/// Why a stage stopped before its input ended
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// Stop as if the input had ended. Not an error.
    Done,
    /// Stop and record the cause on the stage's context
    Failed(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Interrupt::Failed(error)
    }
}

/// Outcome of one step of a stage function
pub type Flow = std::result::Result<(), Interrupt>;

/// Write capability over a stream that refuses to write once its context
/// has failed.
pub struct Emitter<T> {
    context: Context,
    writable: Writable<T>,
}

impl<T: Send + 'static> Emitter<T> {
    /// Bind a stream's producer handle to a context
    pub fn new(context: Context, writable: Writable<T>) -> Self {
        Self { context, writable }
    }

    /// Emit an item downstream.
    ///
    /// Returns [`Interrupt::Done`] without writing if the context has
    /// failed or the reader went away; otherwise waits for room in the
    /// stream.
    pub async fn emit(&self, item: T) -> Flow {
        if self.is_stopped() {
            return Err(Interrupt::Done);
        }

        self.writable.write(item).await;

        #[cfg(feature = "metrics")]
        metrics::counter!("rivulet_items_emitted_total").increment(1);

        Ok(())
    }

    /// Whether `emit` refuses to write: the context failed or the reader
    /// went away
    pub(crate) fn is_stopped(&self) -> bool {
        self.context.is_failed() || self.writable.is_disconnected()
    }

    /// The context this emitter checks before writing
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Release the underlying producer handle
    pub fn into_inner(self) -> Writable<T> {
        self.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream;

    #[tokio::test]
    async fn test_emit_writes_while_healthy() {
        let ctx = Context::new();
        let (writable, readable) = stream::open(2);
        let emitter = Emitter::new(ctx, writable);

        assert!(emitter.emit(1).await.is_ok());
        assert!(emitter.emit(2).await.is_ok());
        drop(emitter);

        assert_eq!(readable.read_all().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_emit_refuses_after_failure() {
        let ctx = Context::new();
        let (writable, readable) = stream::open(2);
        let emitter = Emitter::new(ctx.derive_child(), writable);

        ctx.fail("upstream broke");

        assert!(matches!(emitter.emit(1).await, Err(Interrupt::Done)));
        drop(emitter);
        assert!(readable.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_emit_stops_once_reader_is_gone() {
        let (writable, readable) = stream::open(1);
        let emitter = Emitter::new(Context::new(), writable);
        drop(readable);

        assert!(matches!(emitter.emit(1).await, Err(Interrupt::Done)));
    }

    #[tokio::test]
    async fn test_emit_ignores_close_request() {
        let ctx = Context::new();
        let (writable, readable) = stream::open(1);
        let emitter = Emitter::new(ctx.clone(), writable);

        ctx.close();

        assert!(emitter.emit(5).await.is_ok());
        let mut writable = emitter.into_inner();
        writable.close().unwrap();
        assert_eq!(readable.read_all().await, vec![5]);
    }
}

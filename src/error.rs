//! Error types for pipelines.

use std::sync::Arc;

/// The main error type for pipelines.
///
/// Errors are cheap to clone: a single failure cause is recorded on a
/// context and handed out to every observer that asks for it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A stage function reported a failure
    #[error("Stage error: {0}")]
    Stage(Arc<dyn std::error::Error + Send + Sync>),

    /// A stream producer handle was closed twice
    #[error("Stream was already closed")]
    StreamClosed,

    /// A stage entry point was invoked before a context was attached
    #[error("Stage has no attached context")]
    Detached,

    /// A stage worker unwound while running user code
    #[error("Stage worker panicked")]
    Panicked,

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a stage error from any error type
    pub fn stage<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Stage(Arc::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Stage(Arc::from(e))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for turning foreign errors into stage failures
pub trait IntoStageError<T> {
    /// Wrap the error side in [`Error::Stage`], keeping the value side
    fn into_stage_error(self) -> Result<T>;
}

impl<T, E> IntoStageError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_stage_error(self) -> Result<T> {
        self.map_err(Error::stage)
    }
}

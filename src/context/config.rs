//! Pipeline-wide configuration shared by every context of a tree.

use std::time::Duration;

/// Configuration shared by a context and all contexts derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Default capacity of the streams stages create
    pub buffer_size: usize,
    /// Time after which the root context is asked to close
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            timeout: None,
        }
    }
}

impl Config {
    /// Set the default stream capacity
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the pipeline timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

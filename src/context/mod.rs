//! Hierarchical execution contexts.
//!
//! A [`Context`] is a handle onto one node of a context tree. Every stage
//! derives a child of the context it is attached to before spawning its
//! worker, and closes that child when the worker stops. A context becomes
//! *closed* only once it was asked to close and every child it owns is
//! closed, so closing the root of a pipeline resolves once the whole
//! pipeline has quiesced.
//!
//! Failure is a separate signal. [`Context::fail`] records a cause and makes
//! every descendant observe cancellation immediately, but the closed state is
//! still reached through the bottom-up protocol.
//!
//! ```rust
//! use rivulet::context::Context;
//!
//! let parent = Context::new();
//! let child = parent.derive_child();
//!
//! parent.close();
//! assert!(!parent.is_closed());
//!
//! child.close();
//! assert!(child.is_closed());
//! assert!(parent.is_closed());
//! ```

mod config;
mod tree;

pub use config::Config;
pub use tree::ContextId;

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use tree::Tree;

/// Handle onto a node of a context tree.
///
/// Cloning a `Context` yields another handle onto the same node. A closed
/// node is released from the tree once its last handle is dropped.
pub struct Context {
    tree: Arc<Tree>,
    id: ContextId,
    token: CancellationToken,
}

impl Context {
    /// Create a root context with the default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a root context with the given configuration.
    ///
    /// When the configuration carries a timeout and a tokio runtime is
    /// running, a timer task asks the root to close once the deadline
    /// elapses. The deadline is also checked on every cancellation poll.
    pub fn with_config(config: Config) -> Self {
        let (tree, token) = Tree::new(config);

        if let Some(deadline) = tree.deadline() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(close_at(Arc::downgrade(&tree), deadline));
            }
        }

        Self {
            tree,
            id: ContextId::ROOT,
            token,
        }
    }

    /// Identifier of this context within its tree
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Derive a child context sharing this context's configuration
    pub fn derive_child(&self) -> Context {
        let (id, token) = self.tree.derive(self.id);
        Self {
            tree: self.tree.clone(),
            id,
            token,
        }
    }

    /// Ask this context to close. Idempotent.
    pub fn close(&self) {
        self.tree.request_close(self.id);
    }

    /// Record a failure cause for this context and its descendants.
    ///
    /// Only the first cause is kept.
    pub fn fail(&self, cause: impl Into<Error>) {
        self.tree.fail(self.id, cause.into());
    }

    /// Whether close was requested and every child is closed
    pub fn is_closed(&self) -> bool {
        self.tree.is_closed(self.id)
    }

    /// Whether close was requested on this context itself
    pub fn is_close_requested(&self) -> bool {
        self.tree.is_close_requested(self.id)
    }

    /// Whether this context or an ancestor has failed
    pub fn is_failed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether work under this context should stop.
    ///
    /// True when this context or any ancestor was asked to close or has
    /// failed, or the tree's deadline elapsed.
    pub fn is_cancelled(&self) -> bool {
        self.tree.is_cancelled(self.id)
    }

    /// The failure cause recorded on this context or its nearest failed ancestor
    pub fn failure(&self) -> Option<Error> {
        self.tree.failure(self.id)
    }

    /// Wait until this context is closed
    pub async fn closed(&self) {
        let mut version = self.tree.subscribe();
        while !self.is_closed() {
            if version.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait until this context or an ancestor fails
    pub async fn failed(&self) {
        self.token.cancelled().await;
    }

    /// Wait until [`Context::is_cancelled`] becomes true
    pub async fn cancelled(&self) {
        let mut version = self.tree.subscribe();
        loop {
            if self.is_cancelled() {
                return;
            }

            let deadline = self.tree.deadline();
            tokio::select! {
                _ = self.token.cancelled() => return,
                changed = version.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = sleep_until(deadline) => {}
            }
        }
    }

    /// Shared configuration, the same `Arc` across the whole tree
    pub fn config(&self) -> &Arc<Config> {
        self.tree.config()
    }

    /// The instant at which the root will be asked to close, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.tree.deadline()
    }

    /// Ask this context to close, wait for it to quiesce, and report the
    /// failure cause if one was recorded.
    pub async fn shutdown(&self) -> Result<()> {
        self.close();
        self.closed().await;
        match self.failure() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        self.tree.retain(self.id);
        Self {
            tree: self.tree.clone(),
            id: self.id,
            token: self.token.clone(),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.tree.release(self.id);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("failed", &self.is_failed())
            .finish()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn close_at(tree: Weak<Tree>, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;
    if let Some(tree) = tree.upgrade() {
        tracing::debug!("pipeline deadline elapsed, closing root context");
        tree.request_close(ContextId::ROOT);
    }
}

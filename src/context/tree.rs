//! Arena holding every live node of a context tree.
//!
//! A `ContextId` is a slot index and parent links are ids, so the tree holds
//! no ownership cycles. A node counts its references: one per `Context`
//! handle plus one per child still in the arena. Once a node is closed and
//! nothing references it, its slot is released for reuse, and its parent
//! loses a reference in turn. All state transitions happen under one lock,
//! which makes child registration and the close protocol mutually exclusive.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::Config;
use crate::error::Error;

/// Opaque identifier of a context within its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

impl ContextId {
    pub(crate) const ROOT: ContextId = ContextId(0);
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

struct Node {
    parent: Option<ContextId>,
    // Open children only; a child leaves the set when it closes.
    children: Vec<ContextId>,
    close_requested: bool,
    closed: bool,
    failure: Option<Error>,
    token: CancellationToken,
    refs: usize,
}

impl Node {
    fn new(parent: Option<ContextId>, token: CancellationToken) -> Self {
        Self {
            parent,
            children: Vec::new(),
            close_requested: false,
            closed: false,
            failure: None,
            token,
            refs: 1,
        }
    }
}

#[derive(Default)]
struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    live: usize,
}

impl Arena {
    fn insert(&mut self, node: Node) -> ContextId {
        self.live += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                ContextId(slot)
            }
            None => {
                self.slots.push(Some(node));
                ContextId(self.slots.len() - 1)
            }
        }
    }

    fn remove(&mut self, id: ContextId) -> Option<Node> {
        let node = self.slots[id.0].take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(node)
    }
}

impl Index<ContextId> for Arena {
    type Output = Node;

    fn index(&self, id: ContextId) -> &Node {
        match &self.slots[id.0] {
            Some(node) => node,
            None => panic!("{id} used after release"),
        }
    }
}

impl IndexMut<ContextId> for Arena {
    fn index_mut(&mut self, id: ContextId) -> &mut Node {
        match &mut self.slots[id.0] {
            Some(node) => node,
            None => panic!("{id} used after release"),
        }
    }
}

pub(crate) struct Tree {
    nodes: Mutex<Arena>,
    config: Arc<Config>,
    deadline: Option<Instant>,
    // Bumped on every state transition; waiters subscribe before checking.
    version: watch::Sender<u64>,
}

impl Tree {
    /// Create a tree containing only a root node, referenced once
    pub(crate) fn new(config: Config) -> (Arc<Self>, CancellationToken) {
        let deadline = config.timeout.map(|timeout| Instant::now() + timeout);
        let token = CancellationToken::new();
        let (version, _) = watch::channel(0);

        let mut arena = Arena::default();
        arena.insert(Node::new(None, token.clone()));

        let tree = Arc::new(Self {
            nodes: Mutex::new(arena),
            config: Arc::new(config),
            deadline,
            version,
        });

        (tree, token)
    }

    pub(crate) fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Register a new child under `parent`, referenced once.
    ///
    /// A child of an already-closed node is born closed and is not added to
    /// the parent's child set, so closed stays latched.
    pub(crate) fn derive(&self, parent: ContextId) -> (ContextId, CancellationToken) {
        let mut nodes = self.nodes.lock();
        let parent_node = &mut nodes[parent];
        let born_closed = parent_node.closed;
        let token = parent_node.token.child_token();
        parent_node.refs += 1;

        let mut node = Node::new(Some(parent), token.clone());
        node.close_requested = born_closed;
        node.closed = born_closed;
        let id = nodes.insert(node);

        if !born_closed {
            nodes[parent].children.push(id);
        }

        trace!(%id, %parent, born_closed, "derived context");
        (id, token)
    }

    /// Take another reference on `id`
    pub(crate) fn retain(&self, id: ContextId) {
        self.nodes.lock()[id].refs += 1;
    }

    /// Drop a reference on `id`, releasing every node that became
    /// unreferenced and closed
    pub(crate) fn release(&self, id: ContextId) {
        let mut nodes = self.nodes.lock();
        nodes[id].refs -= 1;
        reclaim(&mut nodes, id);
    }

    /// Mark `id` close-requested and run the bottom-up close protocol
    pub(crate) fn request_close(&self, id: ContextId) {
        let changed = {
            let mut nodes = self.nodes.lock();
            let requested = !nodes[id].close_requested;
            nodes[id].close_requested = true;
            requested | settle(&mut nodes, id)
        };

        if changed {
            self.bump();
        }
    }

    /// Record the failure cause of `id`, first one wins
    pub(crate) fn fail(&self, id: ContextId, cause: Error) {
        {
            let mut nodes = self.nodes.lock();
            let node = &mut nodes[id];
            if node.failure.is_some() {
                return;
            }
            warn!(%id, error = %cause, "context failed");
            node.failure = Some(cause);
            node.token.cancel();
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("rivulet_context_failures_total").increment(1);

        self.bump();
    }

    pub(crate) fn is_closed(&self, id: ContextId) -> bool {
        self.nodes.lock()[id].closed
    }

    pub(crate) fn is_close_requested(&self, id: ContextId) -> bool {
        self.nodes.lock()[id].close_requested
    }

    /// True when `id` or any ancestor was asked to close or has failed
    pub(crate) fn is_cancelled(&self, id: ContextId) -> bool {
        if self.deadline_elapsed() {
            self.request_close(ContextId::ROOT);
        }

        let nodes = self.nodes.lock();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &nodes[id];
            if node.close_requested || node.token.is_cancelled() {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// The nearest failure cause on `id` or one of its ancestors
    pub(crate) fn failure(&self, id: ContextId) -> Option<Error> {
        let nodes = self.nodes.lock();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &nodes[id];
            if let Some(cause) = &node.failure {
                return Some(cause.clone());
            }
            current = node.parent;
        }
        None
    }

    pub(crate) fn deadline_elapsed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    #[cfg(test)]
    pub(crate) fn live_nodes(&self) -> usize {
        self.nodes.lock().live
    }

    #[cfg(test)]
    pub(crate) fn open_children(&self, id: ContextId) -> usize {
        self.nodes.lock()[id].children.len()
    }
}

/// Close `id` if it may close, then walk toward the root while each
/// ancestor becomes closeable. Returns whether any node transitioned.
fn settle(nodes: &mut Arena, mut id: ContextId) -> bool {
    let mut changed = false;

    loop {
        let node = &nodes[id];
        if node.closed || !node.close_requested || !node.children.is_empty() {
            break;
        }

        nodes[id].closed = true;
        changed = true;
        trace!(%id, "context closed");

        match nodes[id].parent {
            Some(parent) => {
                let siblings = &mut nodes[parent].children;
                if let Some(position) = siblings.iter().position(|child| *child == id) {
                    siblings.swap_remove(position);
                }
                id = parent;
            }
            None => break,
        }
    }

    changed
}

/// Release `id` and then its ancestors for as long as each one is closed
/// and unreferenced. The root stays for the lifetime of the tree.
fn reclaim(nodes: &mut Arena, mut id: ContextId) {
    while id != ContextId::ROOT {
        let node = &nodes[id];
        if !node.closed || node.refs > 0 {
            return;
        }

        let Some(node) = nodes.remove(id) else {
            return;
        };
        trace!(%id, "context released");

        match node.parent {
            Some(parent) => {
                nodes[parent].refs -= 1;
                id = parent;
            }
            None => return,
        }
    }
}

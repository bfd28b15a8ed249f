//! Graph Nodes
//!
//! This module defines the vertices of the dependency graph and the mutable
//! state each one guards behind its own lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use smallvec::SmallVec;

use crate::revision::Revision;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slave lists are short in practice; keep them inline.
pub type Slaves = SmallVec<[NodeId; 4]>;

/// Everything about a node that can change after it is created.
///
/// Only reachable through [`Node::lock`], so every read-modify-write of the
/// history happens inside the node's critical section.
#[derive(Debug, Default)]
pub struct NodeState {
    /// Input payload, set by callers.
    data: String,

    /// Nodes that depend on this node's output.
    masters: IndexSet<NodeId>,

    /// Nodes this node's output is computed from. Order is significant.
    slaves: Slaves,

    /// Append-only revision history, oldest first.
    revisions: Vec<Arc<Revision>>,
}

impl NodeState {
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Replace the input payload. Returns `true` if it actually changed.
    pub fn set_data(&mut self, data: impl Into<String>) -> bool {
        let data = data.into();
        if self.data == data {
            return false;
        }
        self.data = data;
        true
    }

    pub fn masters(&self) -> &IndexSet<NodeId> {
        &self.masters
    }

    pub fn slaves(&self) -> &[NodeId] {
        &self.slaves
    }

    /// The most recently appended revision, if any.
    pub fn current_revision(&self) -> Option<&Arc<Revision>> {
        self.revisions.last()
    }

    /// The whole history, oldest first.
    pub fn revisions(&self) -> &[Arc<Revision>] {
        &self.revisions
    }

    pub(crate) fn push_revision(&mut self, revision: Arc<Revision>) {
        self.revisions.push(revision);
    }

    /// Returns `false` if the slave was already present.
    pub(crate) fn add_slave(&mut self, slave: NodeId) -> bool {
        if self.slaves.contains(&slave) {
            return false;
        }
        self.slaves.push(slave);
        true
    }

    pub(crate) fn remove_slave(&mut self, slave: NodeId) -> bool {
        match self.slaves.iter().position(|s| *s == slave) {
            Some(index) => {
                self.slaves.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_master(&mut self, master: NodeId) -> bool {
        self.masters.insert(master)
    }

    pub(crate) fn remove_master(&mut self, master: NodeId) -> bool {
        self.masters.shift_remove(&master)
    }
}

/// A node in the dependency graph.
///
/// The identity is immutable; all mutable state sits behind a per-node mutex
/// so that refreshes of unrelated nodes never contend.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    state: Mutex<NodeState>,
}

impl Node {
    /// Create a node with a fresh ID and the given input.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            state: Mutex::new(NodeState {
                data: data.into(),
                ..NodeState::default()
            }),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Enter the node's critical section.
    pub fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock()
    }

    /// Snapshot of the current revision, taken under the lock.
    pub fn current_revision(&self) -> Option<Arc<Revision>> {
        self.lock().current_revision().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn node_starts_without_revisions() {
        let node = Node::new("x");
        let state = node.lock();
        assert_eq!(state.data(), "x");
        assert!(state.current_revision().is_none());
        assert!(state.slaves().is_empty());
        assert!(state.masters().is_empty());
    }

    #[test]
    fn set_data_reports_changes() {
        let node = Node::new("a");
        let mut state = node.lock();
        assert!(!state.set_data("a"));
        assert!(state.set_data("b"));
        assert_eq!(state.data(), "b");
    }

    #[test]
    fn slave_order_is_preserved() {
        let node = Node::new("");
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());

        let mut state = node.lock();
        assert!(state.add_slave(b));
        assert!(state.add_slave(a));
        assert!(state.add_slave(c));
        assert!(!state.add_slave(a));
        assert_eq!(state.slaves(), &[b, a, c]);

        assert!(state.remove_slave(a));
        assert!(!state.remove_slave(a));
        assert_eq!(state.slaves(), &[b, c]);
    }

    #[test]
    fn master_management() {
        let node = Node::new("");
        let m1 = NodeId::new();
        let m2 = NodeId::new();

        let mut state = node.lock();
        state.add_master(m1);
        state.add_master(m2);
        assert_eq!(state.masters().len(), 2);

        state.remove_master(m1);
        assert!(!state.masters().contains(&m1));
        assert!(state.masters().contains(&m2));
    }

    #[test]
    fn display_uses_hash_prefix() {
        assert_eq!(NodeId::from(12).to_string(), "#12");
    }
}

//! Node Registry
//!
//! The registry owns every node and records master/slave edges on both
//! endpoints. It is the only place edges are created, which lets it keep
//! the relation acyclic: an edge that would close a cycle is rejected here,
//! before any refresh can walk it.
//!
//! Structural edits (edge insertion and removal) are serialised by a single
//! edit lock so that the reachability check and the insertion it guards are
//! atomic with respect to other edits. Refresh never takes that lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::node::{Node, NodeId};
use crate::error::{EngineError, Result};

/// The dependency graph: a registry of nodes addressed by [`NodeId`].
#[derive(Debug, Default)]
pub struct Graph {
    /// All nodes in the graph, indexed by ID.
    nodes: DashMap<NodeId, Arc<Node>>,

    /// Held for the duration of every structural edit.
    edits: Mutex<()>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new node holding `data` and return its handle.
    pub fn add_node(&self, data: impl Into<String>) -> NodeId {
        let node = Node::new(data);
        let id = node.id();
        self.nodes.insert(id, Arc::new(node));
        debug!(node = %id, "node added");
        id
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Result<Arc<Node>> {
        self.nodes
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Make `slave` a dependency of `master`.
    ///
    /// Returns `Ok(false)` if the edge already existed. Fails with
    /// [`EngineError::CycleDetected`] if `master` is reachable from `slave`
    /// (including the self-edge case); the graph is left untouched.
    pub fn add_edge(&self, master: NodeId, slave: NodeId) -> Result<bool> {
        let _edit = self.edits.lock();

        let master_node = self.node(master)?;
        let slave_node = self.node(slave)?;

        if master == slave || self.reaches(slave, master)? {
            return Err(EngineError::CycleDetected { master, slave });
        }

        // Master before slave, the same order refresh uses.
        let mut master_state = master_node.lock();
        let mut slave_state = slave_node.lock();
        let added = master_state.add_slave(slave);
        slave_state.add_master(master);

        if added {
            debug!(master = %master, slave = %slave, "edge added");
        }
        Ok(added)
    }

    /// Remove the edge `master -> slave`. Returns `Ok(false)` if it did not exist.
    pub fn remove_edge(&self, master: NodeId, slave: NodeId) -> Result<bool> {
        let _edit = self.edits.lock();

        let master_node = self.node(master)?;
        let slave_node = self.node(slave)?;

        let mut master_state = master_node.lock();
        let mut slave_state = slave_node.lock();
        let removed = master_state.remove_slave(slave);
        slave_state.remove_master(master);

        if removed {
            debug!(master = %master, slave = %slave, "edge removed");
        }
        Ok(removed)
    }

    /// Whether `to` can be reached from `from` by following slave edges.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(id) = stack.pop() {
            if id == to {
                return Ok(true);
            }
            if !visited.insert(id) {
                continue;
            }
            let node = self.node(id)?;
            stack.extend(node.lock().slaves().iter().copied());
        }

        Ok(false)
    }

    /// Replace a node's input. Returns `Ok(true)` if the value changed.
    pub fn set_data(&self, id: NodeId, data: impl Into<String>) -> Result<bool> {
        let changed = self.node(id)?.lock().set_data(data);
        if changed {
            debug!(node = %id, "input changed");
        }
        Ok(changed)
    }

    pub fn data(&self, id: NodeId) -> Result<String> {
        Ok(self.node(id)?.lock().data().to_owned())
    }

    pub fn masters(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.node(id)?.lock().masters().iter().copied().collect())
    }

    pub fn slaves(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.node(id)?.lock().slaves().to_vec())
    }

    /// Nodes nothing depends on, in ID order.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .snapshot_nodes()
            .into_iter()
            .filter(|node| node.lock().masters().is_empty())
            .map(|node| node.id())
            .collect();
        roots.sort();
        roots
    }

    /// All nodes ordered so that every slave comes before its masters.
    ///
    /// Ties are broken by ID, so the order is deterministic for a given graph.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut pending: HashMap<NodeId, usize> = HashMap::new();
        let mut masters_of: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut ready = Vec::new();

        for node in self.snapshot_nodes() {
            let state = node.lock();
            let degree = state.slaves().len();
            pending.insert(node.id(), degree);
            masters_of.insert(node.id(), state.masters().iter().copied().collect());
            if degree == 0 {
                ready.push(node.id());
            }
        }

        ready.sort();
        let mut queue: VecDeque<NodeId> = ready.into();
        let mut result = Vec::with_capacity(pending.len());

        // Kahn's algorithm
        while let Some(id) = queue.pop_front() {
            result.push(id);

            let mut unlocked = Vec::new();
            for master in masters_of.get(&id).into_iter().flatten() {
                if let Some(degree) = pending.get_mut(master) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        unlocked.push(*master);
                    }
                }
            }
            unlocked.sort();
            queue.extend(unlocked);
        }

        result
    }

    /// Clone out the node handles so no map shard stays locked while callers
    /// take node locks.
    fn snapshot_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

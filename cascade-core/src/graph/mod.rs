//! Dependency Graph
//!
//! This module implements the graph of nodes the engine recomputes over.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes hold a mutable input and an append-only revision history
//! - A *master* depends on the output of its *slaves*; every edge is recorded
//!   on both endpoints
//!
//! # Design Decisions
//!
//! 1. Nodes are addressed by [`NodeId`] handles stored in a central registry
//!    rather than linked by direct references, so a node reachable through
//!    several masters is never aliased mutably.
//!
//! 2. Each node carries its own mutex. Unrelated subgraphs never contend, and
//!    locks are always taken master before slave, which cannot deadlock on an
//!    acyclic graph.
//!
//! 3. Cycles are rejected when an edge is inserted, so traversal code can
//!    assume acyclicity without checking for it.

mod node;
mod registry;

pub use node::{Node, NodeId, NodeState, Slaves};
pub use registry::Graph;

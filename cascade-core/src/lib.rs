//! Cascade Core
//!
//! This crate provides the core engine for Cascade, an incremental
//! recomputation graph. It implements:
//!
//! - Hash-identified, append-only revision histories per node
//! - Leaves-first change detection over a dependency DAG
//! - Write-once, single-flight output computation
//! - Completion propagation from slaves up to their masters
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `revision`: Fingerprints, revisions and the output collaborator
//! - `graph`: Nodes, their per-node locks and the edge registry
//! - `engine`: Refresh, job dispatch and the background worker
//! - `config`: Engine settings
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_core::Engine;
//!
//! let engine = Engine::new(|combined: String| combined.to_uppercase());
//!
//! // a depends on b
//! let b = engine.add_node("x");
//! let a = engine.add_node("a");
//! engine.add_edge(a, b)?;
//!
//! let rev = engine.refresh(a)?;
//! assert_eq!(rev.output(), Some("AX"));
//!
//! // Only what changed is recomputed
//! engine.set_data(b, "y")?;
//! let rev = engine.refresh(a)?;
//! assert_eq!(rev.output(), Some("AY"));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod revision;

pub use config::{EngineConfig, ExecutionMode};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use graph::{Graph, NodeId};
pub use revision::{Fingerprint, Fingerprinter, Passthrough, Processor, Revision, RevisionId, TextFingerprint};

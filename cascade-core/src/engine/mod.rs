//! Recomputation Engine
//!
//! The engine drives refresh over the graph, schedules output computation
//! and carries completion upward from slaves to masters.
//!
//! # Execution
//!
//! Refresh only emits [`Job`]s; it never runs a processor itself. Where those
//! jobs run depends on [`ExecutionMode`](crate::config::ExecutionMode):
//!
//! - `Inline`: drained on the calling thread before `refresh` returns, so the
//!   whole graph is settled when it does.
//! - `Background`: sent to a tokio worker. `refresh` returns right away and
//!   outputs appear as the worker gets to them.

mod audit;
mod job;
mod runtime;
mod worker;

pub use audit::{ChildLink, EngineSnapshot, NodeHistory, RevisionSummary};
pub use job::Job;
pub use runtime::{Engine, EngineBuilder};

//! Engine Errors
//!
//! Every fallible operation in the crate returns [`EngineError`]. None of
//! these errors are recoverable locally: they abort the refresh or output
//! computation that raised them and are handed back to the caller untouched.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised by the graph and the recomputation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Output computation was attempted while a dependency revision had no
    /// output yet.
    ///
    /// Refresh only schedules computation once every dependency is complete,
    /// so seeing this means something called `compute_output` out of order.
    #[error("revision of node {node} depends on node {slave}, which has no output yet")]
    MissingDependencyOutput {
        /// The node whose revision was being computed.
        node: NodeId,
        /// The first dependency found without output.
        slave: NodeId,
    },

    /// Inserting the edge `master -> slave` would close a dependency cycle.
    #[error("edge {master} -> {slave} would create a dependency cycle")]
    CycleDetected { master: NodeId, slave: NodeId },

    /// The node id is not registered in the graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The engine configuration could not be parsed.
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// Background execution was requested but no worker can accept jobs.
    #[error("background worker unavailable")]
    WorkerUnavailable,
}

/// Result alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_nodes() {
        let err = EngineError::CycleDetected {
            master: NodeId::from(3),
            slave: NodeId::from(7),
        };
        assert_eq!(
            err.to_string(),
            "edge #3 -> #7 would create a dependency cycle"
        );

        let err = EngineError::MissingDependencyOutput {
            node: NodeId::from(1),
            slave: NodeId::from(2),
        };
        assert!(err.to_string().contains("node #2"));
    }

    #[test]
    fn json_errors_become_config_errors() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(EngineError::from(parse), EngineError::Config(_)));
    }
}

use std::fmt;
use std::sync::Arc;

use crate::graph::NodeId;
use crate::revision::Revision;

/// A unit of deferred work.
///
/// Refresh never computes output or notifies masters directly; it emits jobs
/// which run once every node lock taken by the refresh has been released.
#[derive(Clone)]
pub enum Job {
    /// Compute and store the output of this revision, then notify masters.
    ComputeOutput(Arc<Revision>),

    /// Refresh this node. Emitted once per master on completion.
    Refresh(NodeId),
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::ComputeOutput(revision) => f
                .debug_struct("ComputeOutput")
                .field("node", &revision.node())
                .field("revision", &revision.id())
                .finish(),
            Job::Refresh(node) => f.debug_tuple("Refresh").field(node).finish(),
        }
    }
}

//! History Snapshots
//!
//! Only the current revision matters to refresh; older revisions are kept
//! for inspection. A snapshot flattens every node's history into plain,
//! serializable records.

use serde::Serialize;

use crate::graph::{Node, NodeId};
use crate::revision::{Fingerprint, Revision, RevisionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildLink {
    pub slave: NodeId,
    pub revision: RevisionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSummary {
    pub id: RevisionId,
    pub hash: Fingerprint,
    pub input_hash: Fingerprint,
    pub children: Vec<ChildLink>,
    pub output: Option<String>,
}

impl From<&Revision> for RevisionSummary {
    fn from(revision: &Revision) -> Self {
        Self {
            id: revision.id(),
            hash: revision.hash().clone(),
            input_hash: revision.input_hash().clone(),
            children: revision
                .child_revisions()
                .iter()
                .map(|(slave, child)| ChildLink {
                    slave: *slave,
                    revision: child.id(),
                })
                .collect(),
            output: revision.output().map(str::to_owned),
        }
    }
}

/// One node's edges and revision history, oldest revision first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHistory {
    pub node: NodeId,
    pub data: String,
    pub masters: Vec<NodeId>,
    pub slaves: Vec<NodeId>,
    pub revisions: Vec<RevisionSummary>,
}

impl NodeHistory {
    pub(crate) fn capture(node: &Node) -> Self {
        let state = node.lock();
        Self {
            node: node.id(),
            data: state.data().to_owned(),
            masters: state.masters().iter().copied().collect(),
            slaves: state.slaves().to_vec(),
            revisions: state
                .revisions()
                .iter()
                .map(|revision| RevisionSummary::from(revision.as_ref()))
                .collect(),
        }
    }
}

/// All node histories, slaves before masters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub nodes: Vec<NodeHistory>,
}

impl EngineSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeHistory> {
        self.nodes.iter().find(|history| history.node == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

//! Revision Records
//!
//! A revision is one observed state of a node: the node's input at the time,
//! the exact revisions of its slaves that were current then, and the hash
//! derived from both. Everything except the output slot is fixed at
//! construction.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use super::fingerprint::{Fingerprint, Fingerprinter};
use super::output::{OutputSlot, Processor};
use crate::error::{EngineError, Result};
use crate::graph::NodeId;

/// Revisions of the slaves, keyed by slave and kept in slave order.
pub type ChildRevisions = IndexMap<NodeId, Arc<Revision>>;

/// Unique identifier for a revision.
///
/// Change detection compares revisions by this identity, not by hash: a new
/// revision always means "observed again after a change", even if the state
/// happens to be equivalent to an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RevisionId(u64);

impl RevisionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An immutable snapshot of a node's state, with a lazily filled output.
pub struct Revision {
    id: RevisionId,

    /// Owning node. A handle, not an ownership edge.
    node: NodeId,

    /// The node's input when this revision was taken.
    input: String,

    input_hash: Fingerprint,

    child_revisions: ChildRevisions,

    /// Child hashes in slave order, then `input_hash`.
    hash: Fingerprint,

    output: OutputSlot,
}

impl Revision {
    /// Capture `input` and the given child revisions as a new revision of `node`.
    pub fn new(
        node: NodeId,
        input: impl Into<String>,
        fingerprinter: &dyn Fingerprinter,
        child_revisions: ChildRevisions,
    ) -> Self {
        let input = input.into();
        let input_hash = fingerprinter.fingerprint(&input);
        Self::with_input_hash(node, input, input_hash, child_revisions)
    }

    /// Like [`Revision::new`] for a caller that already fingerprinted `input`.
    pub(crate) fn with_input_hash(
        node: NodeId,
        input: String,
        input_hash: Fingerprint,
        child_revisions: ChildRevisions,
    ) -> Self {
        let hash = Fingerprint::compose(
            child_revisions.values().map(|child| &child.hash),
            &input_hash,
        );

        Self {
            id: RevisionId::next(),
            node,
            input,
            input_hash,
            child_revisions,
            hash,
            output: OutputSlot::default(),
        }
    }

    pub fn id(&self) -> RevisionId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_hash(&self) -> &Fingerprint {
        &self.input_hash
    }

    pub fn hash(&self) -> &Fingerprint {
        &self.hash
    }

    pub fn child_revisions(&self) -> &ChildRevisions {
        &self.child_revisions
    }

    /// The revision recorded for `slave`, if it was a slave at the time.
    pub fn child(&self, slave: NodeId) -> Option<&Arc<Revision>> {
        self.child_revisions.get(&slave)
    }

    pub fn output(&self) -> Option<&str> {
        self.output.get()
    }

    pub fn has_output(&self) -> bool {
        self.output.get().is_some()
    }

    /// Same input and same dependency states, however each was produced.
    pub fn is_equivalent(&self, other: &Revision) -> bool {
        self.hash == other.hash
    }

    /// The first slave whose recorded revision has no output yet.
    pub fn missing_dependency(&self) -> Option<NodeId> {
        self.child_revisions
            .iter()
            .find(|(_, child)| !child.has_output())
            .map(|(slave, _)| *slave)
    }

    /// Own input followed by every child's output, in slave order.
    pub fn combined_input(&self) -> Result<String> {
        let mut combined = self.input.clone();
        for (slave, child) in &self.child_revisions {
            let output = child.output().ok_or(EngineError::MissingDependencyOutput {
                node: self.node,
                slave: *slave,
            })?;
            combined.push_str(output);
        }
        Ok(combined)
    }

    /// Compute and store this revision's output, or return the stored one.
    /// The flag is true only for the call that stored it.
    ///
    /// Fails with [`EngineError::MissingDependencyOutput`] if a child revision
    /// has no output; the slot is left empty in that case. Once stored, later
    /// calls return the same value without invoking `processor`.
    ///
    /// Masters are not notified here. Outside callers go through
    /// [`Engine::compute_output`](crate::Engine::compute_output), which does.
    pub(crate) fn fill_output(&self, processor: &dyn Processor) -> Result<(String, bool)> {
        let filled = self.output.get_or_try_fill(|| {
            let combined = self.combined_input()?;
            Ok(processor.process(combined))
        })?;

        if filled.1 {
            trace!(node = %self.node, revision = %self.id, "output stored");
        }
        Ok(filled)
    }

    /// Resolve once output is present.
    ///
    /// If computing the output fails or the processor panics, nothing is
    /// stored and this does not resolve until a later refresh schedules the
    /// revision again and that attempt succeeds. Callers that cannot rely on
    /// that should bound the wait with `tokio::time::timeout`.
    pub async fn wait_output(&self) -> String {
        self.output.wait().await
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revision")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("hash", &self.hash)
            .field(
                "children",
                &self
                    .child_revisions
                    .values()
                    .map(|child| child.id)
                    .collect::<Vec<_>>(),
            )
            .field("output", &self.output())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::{Passthrough, TextFingerprint};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn leaf(input: &str) -> Arc<Revision> {
        Arc::new(Revision::new(
            NodeId::new(),
            input,
            &TextFingerprint,
            ChildRevisions::new(),
        ))
    }

    fn compute(rev: &Revision, processor: &dyn Processor) -> Result<String> {
        rev.fill_output(processor).map(|(output, _)| output)
    }

    fn children(revisions: &[&Arc<Revision>]) -> ChildRevisions {
        revisions
            .iter()
            .map(|rev| (rev.node(), Arc::clone(rev)))
            .collect()
    }

    #[test]
    fn hash_is_deterministic() {
        let b = leaf("x");
        let c = leaf("y");
        let node = NodeId::new();

        let first = Revision::new(node, "a", &TextFingerprint, children(&[&b, &c]));
        let second = Revision::new(node, "a", &TextFingerprint, children(&[&b, &c]));

        assert_eq!(first.hash(), second.hash());
        assert_eq!(first.hash().as_str(), "xya");
        assert!(first.is_equivalent(&second));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn hash_follows_slave_order() {
        let b = leaf("x");
        let c = leaf("y");
        let node = NodeId::new();

        let bc = Revision::new(node, "", &TextFingerprint, children(&[&b, &c]));
        let cb = Revision::new(node, "", &TextFingerprint, children(&[&c, &b]));

        assert!(!bc.is_equivalent(&cb));
    }

    #[test]
    fn given_input_hash_is_used_as_is() {
        let b = leaf("x");
        let node = NodeId::new();

        let hashed = Revision::with_input_hash(
            node,
            "a".to_string(),
            Fingerprint::from("A"),
            children(&[&b]),
        );

        assert_eq!(hashed.input(), "a");
        assert_eq!(hashed.input_hash().as_str(), "A");
        assert_eq!(hashed.hash().as_str(), "xA");
    }

    #[test]
    fn leaf_hash_ends_with_input_fingerprint() {
        let rev = leaf("x");
        assert!(rev.hash().ends_with(&TextFingerprint.fingerprint("x")));
        assert!(rev.child_revisions().is_empty());
    }

    #[test]
    fn output_requires_dependency_outputs() {
        let b = leaf("x");
        let a = Revision::new(NodeId::new(), "a", &TextFingerprint, children(&[&b]));

        assert_eq!(a.missing_dependency(), Some(b.node()));
        assert_eq!(
            compute(&a, &Passthrough),
            Err(EngineError::MissingDependencyOutput {
                node: a.node(),
                slave: b.node(),
            })
        );
        assert!(!a.has_output());
    }

    #[test]
    fn output_concatenates_input_and_child_outputs() {
        let b = leaf("x");
        let c = leaf("y");
        compute(&b, &Passthrough).unwrap();
        compute(&c, &Passthrough).unwrap();

        let a = Revision::new(NodeId::new(), "a", &TextFingerprint, children(&[&b, &c]));
        assert_eq!(a.missing_dependency(), None);
        assert_eq!(compute(&a, &Passthrough).unwrap(), "axy");
        assert_eq!(a.output(), Some("axy"));
    }

    #[test]
    fn output_is_computed_once() {
        let calls = AtomicUsize::new(0);
        let processor = |combined: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            format!("<{combined}>")
        };

        let rev = leaf("x");
        assert_eq!(compute(&rev, &processor).unwrap(), "<x>");
        assert_eq!(compute(&rev, &processor).unwrap(), "<x>");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_computation_is_single_flight() {
        let calls = AtomicUsize::new(0);
        let processor = |combined: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            combined
        };

        let rev = leaf("x");
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert_eq!(compute(&rev, &processor).unwrap(), "x");
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Revisions
//!
//! The leaf layer of the engine: hash-identified snapshots of node state and
//! the collaborator contracts they depend on.
//!
//! # Concepts
//!
//! ## Fingerprint
//!
//! A deterministic digest of a node's input. A revision's hash is the
//! concatenation of its children's hashes, in slave order, followed by the
//! input fingerprint, so two revisions with the same hash describe the same
//! input over the same dependency states.
//!
//! ## Output
//!
//! Each revision has a slot for the output of its state. The slot is filled
//! at most once, by a [`Processor`] applied to the revision's input joined
//! with every child's output. Until then it is empty, and an empty slot is
//! never treated as a finished value.

mod fingerprint;
mod output;
mod record;

pub use fingerprint::{Fingerprint, Fingerprinter, TextFingerprint};
pub use output::{Passthrough, Processor};
pub use record::{ChildRevisions, Revision, RevisionId};

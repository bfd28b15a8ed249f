//! Fingerprints
//!
//! A fingerprint is the textual digest used to decide whether two observed
//! states are the same. Node inputs are fingerprinted by a [`Fingerprinter`];
//! revision hashes are composed from those by plain concatenation, children
//! first in slave order, so the composition is order sensitive.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// An immutable, cheaply clonable digest.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(Arc<str>);

impl Fingerprint {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Concatenate `children` in order, followed by `input`.
    pub fn compose<'a, I>(children: I, input: &Fingerprint) -> Self
    where
        I: IntoIterator<Item = &'a Fingerprint>,
    {
        let mut hash = String::new();
        for child in children {
            hash.push_str(child.as_str());
        }
        hash.push_str(input.as_str());
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ends_with(&self, suffix: &Fingerprint) -> bool {
        self.0.ends_with(suffix.as_str())
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:?})", &*self.0)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Maps a node's input to its fingerprint.
///
/// Must be deterministic, and must change exactly when the input changed in a
/// way that should trigger recomputation.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, data: &str) -> Fingerprint;
}

impl<F> Fingerprinter for F
where
    F: Fn(&str) -> Fingerprint + Send + Sync,
{
    fn fingerprint(&self, data: &str) -> Fingerprint {
        self(data)
    }
}

/// Uses the input's text verbatim as its fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFingerprint;

impl Fingerprinter for TextFingerprint {
    fn fingerprint(&self, data: &str) -> Fingerprint {
        Fingerprint::from(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_is_children_then_input() {
        let children = [Fingerprint::from("ab"), Fingerprint::from("cd")];
        let hash = Fingerprint::compose(&children, &Fingerprint::from("x"));
        assert_eq!(hash.as_str(), "abcdx");
        assert!(hash.ends_with(&Fingerprint::from("x")));
    }

    #[test]
    fn compose_is_order_sensitive() {
        let input = Fingerprint::from("i");
        let a = Fingerprint::from("a");
        let b = Fingerprint::from("b");
        assert_ne!(
            Fingerprint::compose([&a, &b], &input),
            Fingerprint::compose([&b, &a], &input)
        );
    }

    #[test]
    fn text_fingerprint_is_identity() {
        assert_eq!(TextFingerprint.fingerprint("hello").as_str(), "hello");
        assert!(TextFingerprint.fingerprint("").is_empty());
    }

    #[test]
    fn closures_are_fingerprinters() {
        let upper = |data: &str| Fingerprint::from(data.to_uppercase());
        assert_eq!(upper.fingerprint("abc").as_str(), "ABC");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Fingerprint::from("xy")).unwrap();
        assert_eq!(json, "\"xy\"");
    }
}

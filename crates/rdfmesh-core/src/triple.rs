//! RDF triples: immutable, content-addressed facts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::TripleHash;

/// An immutable (subject, predicate, object) fact.
///
/// The hash is computed once at construction and is the triple's identity:
/// equality and hashing go through it, and two triples with the same
/// components are the same fact on every peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triple {
    subject: String,
    predicate: String,
    object: String,
    hash: TripleHash,
}

impl Triple {
    /// Create a triple, computing its content hash.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        let predicate = predicate.into();
        let object = object.into();
        let hash = compute_hash(&subject, &predicate, &object);
        Self {
            subject,
            predicate,
            object,
            hash,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    /// The content address of this triple.
    pub fn hash(&self) -> TripleHash {
        self.hash
    }

    /// Check that the stored hash matches the components.
    ///
    /// Decoding trusts the hash carried on the wire; this is the explicit
    /// check for callers that want to validate untrusted input.
    pub fn verify_hash(&self) -> bool {
        compute_hash(&self.subject, &self.predicate, &self.object) == self.hash
    }
}

impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Triple {}

impl std::hash::Hash for Triple {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.0.hash(state);
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

/// Canonical byte encoding: each field length-prefixed (u64 little-endian),
/// in (object, predicate, subject) order.
fn canonical_bytes(subject: &str, predicate: &str, object: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(24 + subject.len() + predicate.len() + object.len());
    for field in [object, predicate, subject] {
        out.extend_from_slice(&(field.len() as u64).to_le_bytes());
        out.extend_from_slice(field.as_bytes());
    }
    out
}

fn compute_hash(subject: &str, predicate: &str, object: &str) -> TripleHash {
    let digest = Sha256::digest(canonical_bytes(subject, predicate, object));
    TripleHash(digest.into())
}

//! Revisions: the immutable nodes of the replication DAG.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::delta::Delta;
use crate::triple::Triple;
use crate::types::{AuthorId, RevisionHash};

/// One node of the revision DAG.
///
/// A revision has zero parents (the root), one parent (a plain edit) or two
/// parents (a merge). Its hash covers the full content: parents, author,
/// creation time and the delta key sets, so any relinking (rebase) or delta
/// mutation changes the address. A revision is only ever mutated while it is
/// the local author's in-progress head; [`Document`](crate::Document) re-keys
/// it after each mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    parents: Vec<RevisionHash>,
    author: AuthorId,
    created_at: i64,
    hash: RevisionHash,
    #[serde(flatten)]
    delta: Delta,
}

impl Revision {
    /// Create an empty revision at the current wall-clock time.
    pub fn new(parents: Vec<RevisionHash>, author: AuthorId) -> Self {
        Self::new_at(parents, author, now_millis())
    }

    /// Create an empty revision with an explicit timestamp.
    pub fn new_at(parents: Vec<RevisionHash>, author: AuthorId, created_at: i64) -> Self {
        let mut revision = Self {
            parents,
            author,
            created_at,
            hash: RevisionHash::from_bytes([0u8; 32]),
            delta: Delta::new(),
        };
        revision.rehash();
        revision
    }

    /// Create a revision carrying a prepared delta (merge construction).
    pub fn with_delta(parents: Vec<RevisionHash>, author: AuthorId, delta: Delta) -> Self {
        let mut revision = Self {
            parents,
            author,
            created_at: now_millis(),
            hash: RevisionHash::from_bytes([0u8; 32]),
            delta,
        };
        revision.rehash();
        revision
    }

    pub fn hash(&self) -> RevisionHash {
        self.hash
    }

    pub fn parents(&self) -> &[RevisionHash] {
        &self.parents
    }

    pub fn author(&self) -> &AuthorId {
        &self.author
    }

    /// Creation time, unix milliseconds as claimed by the author.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    /// A merge revision has two parents.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Record an addition into this revision's delta.
    ///
    /// Callers must re-key afterwards; the hash no longer matches.
    pub(crate) fn record_add(&mut self, triple: Triple) {
        self.delta.record_add(triple);
    }

    /// Record a removal into this revision's delta.
    pub(crate) fn record_remove(&mut self, triple: Triple) {
        self.delta.record_remove(triple);
    }

    /// Relink onto different parents (rebase).
    pub(crate) fn set_parents(&mut self, parents: Vec<RevisionHash>) {
        self.parents = parents;
    }

    /// Recompute the content hash after mutation.
    pub(crate) fn rehash(&mut self) {
        self.hash = self.compute_hash();
    }

    /// SHA-256 over the canonical content encoding.
    ///
    /// Delta entries contribute their triple hashes only; the triple hash
    /// is itself a content address, so triple bodies are covered
    /// transitively. Map iteration is sorted (BTreeMap), making the
    /// encoding deterministic.
    pub fn compute_hash(&self) -> RevisionHash {
        let mut hasher = Sha256::new();
        hasher.update(b"rdfmesh-revision-v1:");
        hasher.update((self.parents.len() as u64).to_le_bytes());
        for parent in &self.parents {
            hasher.update(parent.as_bytes());
        }
        hasher.update((self.author.as_str().len() as u64).to_le_bytes());
        hasher.update(self.author.as_str().as_bytes());
        hasher.update(self.created_at.to_le_bytes());
        hasher.update((self.delta.adds().len() as u64).to_le_bytes());
        for hash in self.delta.adds().keys() {
            hasher.update(hash.as_bytes());
        }
        hasher.update((self.delta.removes().len() as u64).to_le_bytes());
        for hash in self.delta.removes().keys() {
            hasher.update(hash.as_bytes());
        }
        RevisionHash(hasher.finalize().into())
    }
}

/// Current time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

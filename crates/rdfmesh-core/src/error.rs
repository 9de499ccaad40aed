//! Error types for the rdfmesh core model.

use thiserror::Error;

use crate::types::{AuthorId, RevisionHash};

/// Errors raised by document and DAG operations.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Attempt to mutate a revision created by another author. This is a
    /// programming-level invariant breach, not a recoverable protocol
    /// condition.
    #[error("cannot edit a revision owned by another author ({owner})")]
    OwnershipViolation { owner: AuthorId },

    /// An ancestry walk referenced a revision that is not present locally.
    /// Recoverable: the caller should fetch it and retry later.
    #[error("missing ancestor revision {0}")]
    MissingRevision(RevisionHash),

    /// Two histories share no root. Should never happen for documents
    /// bootstrapped from a common origin; treated as a protocol invariant
    /// violation.
    #[error("no common ancestor between revisions")]
    NoCommonAncestor,

    /// No parent chain connects the two revisions.
    #[error("no path from {from} to {to}")]
    NoPath { from: RevisionHash, to: RevisionHash },

    /// The document has no revisions yet.
    #[error("document has no revisions")]
    EmptyDocument,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

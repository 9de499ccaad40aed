//! # rdfmesh Core
//!
//! Pure primitives for rdfmesh: triples, revisions, deltas, and the
//! per-peer document replica.
//!
//! This crate contains no I/O and no networking. It is pure computation
//! over a content-addressed revision DAG.
//!
//! ## Key Types
//!
//! - [`Triple`] - An immutable (subject, predicate, object) fact
//! - [`Delta`] - The add/remove effect of a revision, with a squash algebra
//! - [`Revision`] - One DAG node: parents, author, timestamp, delta
//! - [`Document`] - A peer's replica: revision arena, head, cached state
//!
//! ## Identity
//!
//! Triples and revisions are addressed by SHA-256 content hashes
//! ([`TripleHash`], [`RevisionHash`]); a revision's hash covers its parent
//! links, so relinking a branch (rebase) re-addresses it.

pub mod delta;
pub mod document;
pub mod error;
pub mod revision;
pub mod triple;
pub mod types;

pub use delta::Delta;
pub use document::{Document, EditSource, FragmentOp};
pub use error::{DocumentError, Result};
pub use revision::Revision;
pub use triple::Triple;
pub use types::{AuthorId, RevisionHash, TripleHash};

//! # rdfmesh Sync
//!
//! The gossip protocol that converges [`rdfmesh_core::Document`] replicas
//! across a mesh of peers.
//!
//! Each peer runs an [`Agent`]: it announces its head to every directory
//! member on a fixed cadence, applies local edits, and integrates inbound
//! revisions. One peer at a time, elected deterministically by smallest
//! address, acts as merge master and folds diverging branches into merge
//! revisions; peers whose divergence is entirely self-authored rebase onto
//! incoming merges instead.
//!
//! Transport is abstracted behind [`Transport`]; an in-memory
//! implementation backs the tests.

pub mod agent;
pub mod changelog;
pub mod config;
pub mod directory;
pub mod error;
pub mod messages;
pub mod peers;
pub mod transport;

pub use agent::{Agent, AgentObserver};
pub use changelog::{ChangeEvent, ChangeLog};
pub use config::AgentConfig;
pub use directory::{PeerDirectory, SharedDirectory};
pub use error::{DecodeError, Result, SyncError};
pub use messages::{Envelope, PeerMessage, Performative, RequestBody, StatusBody};
pub use peers::{elect_merge_master, KnownPeer, KnownPeers, PeerId};
pub use transport::Transport;

//! Error types for the sync layer.

use thiserror::Error;

use crate::peers::PeerId;

/// Errors that can occur while running the gossip protocol.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport could not deliver a message to a peer.
    #[error("delivery to {peer} failed")]
    DeliveryFailure { peer: PeerId },

    /// The local inbox channel is closed; the transport is gone.
    #[error("transport channel closed")]
    ChannelClosed,

    /// A document operation failed.
    #[error("document error: {0}")]
    Document(#[from] rdfmesh_core::DocumentError),

    /// Message encoding failed.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reasons an inbound envelope is dropped before handling.
///
/// Decode failures are not protocol errors: unknown or malformed traffic
/// is logged and ignored, per the fail-quiet inbound policy.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope's ontology is not one of ours.
    #[error("unknown ontology {0:?}")]
    UnknownOntology(String),

    /// The body did not match the ontology's schema.
    #[error("malformed body: {0}")]
    Body(#[from] serde_json::Error),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

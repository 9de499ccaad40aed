//! Transport abstraction for the gossip protocol.
//!
//! The transport delivers opaque envelopes between peer addresses.
//! Implementations may use XMPP, WebSockets, or any other carrier; the
//! in-memory implementation below backs the tests.

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::messages::Envelope;
use crate::peers::PeerId;

/// Transport trait for sending and receiving envelopes.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an envelope to a specific peer.
    async fn send(&self, peer: &PeerId, envelope: Envelope) -> Result<()>;

    /// Receive the next envelope from any peer.
    ///
    /// Returns the sender's address and the envelope. Blocks until a
    /// message is available or the transport shuts down.
    async fn recv(&self) -> Result<(PeerId, Envelope)>;

    /// Receive with timeout.
    ///
    /// Returns None if the timeout expires before an envelope arrives.
    async fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Option<(PeerId, Envelope)>>;

    /// The local peer's address.
    fn local_peer_id(&self) -> PeerId;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate message passing between peers.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, RwLock};

    /// Routed message with its sender.
    #[derive(Debug, Clone)]
    struct Routed {
        from: PeerId,
        envelope: Envelope,
    }

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Inbox senders for each peer.
        senders: RwLock<HashMap<PeerId, mpsc::Sender<Routed>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                senders: RwLock::new(HashMap::new()),
            })
        }

        /// Create a transport connected to this network.
        pub async fn create_transport(self: &Arc<Self>, peer_id: PeerId) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(1000);

            self.senders.write().await.insert(peer_id.clone(), tx);

            MemoryTransport {
                peer_id,
                network: Arc::clone(self),
                receiver: RwLock::new(rx),
            }
        }

        /// Drop a peer's inbox, simulating a crash or network partition.
        /// Sends to it fail from then on.
        pub async fn disconnect(&self, peer_id: &PeerId) {
            self.senders.write().await.remove(peer_id);
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        peer_id: PeerId,
        network: Arc<MemoryNetwork>,
        receiver: RwLock<mpsc::Receiver<Routed>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, peer: &PeerId, envelope: Envelope) -> Result<()> {
            let senders = self.network.senders.read().await;
            let sender = senders.get(peer).ok_or_else(|| SyncError::DeliveryFailure {
                peer: peer.clone(),
            })?;
            sender
                .send(Routed {
                    from: self.peer_id.clone(),
                    envelope,
                })
                .await
                .map_err(|_| SyncError::DeliveryFailure { peer: peer.clone() })
        }

        async fn recv(&self) -> Result<(PeerId, Envelope)> {
            let mut rx = self.receiver.write().await;
            match rx.recv().await {
                Some(routed) => Ok((routed.from, routed.envelope)),
                None => Err(SyncError::ChannelClosed),
            }
        }

        async fn recv_timeout(
            &self,
            timeout: std::time::Duration,
        ) -> Result<Option<(PeerId, Envelope)>> {
            let mut rx = self.receiver.write().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(routed)) => Ok(Some((routed.from, routed.envelope))),
                Ok(None) => Err(SyncError::ChannelClosed),
                Err(_) => Ok(None), // Timeout
            }
        }

        fn local_peer_id(&self) -> PeerId {
            self.peer_id.clone()
        }
    }
}

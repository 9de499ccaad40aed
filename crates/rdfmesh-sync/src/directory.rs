//! Peer directory: who is reachable on the transport right now.
//!
//! Status announcements fan out to directory members; everything else in
//! the protocol is addressed to peers learned from those announcements.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::peers::PeerId;

/// Registry of currently-reachable peer addresses.
pub trait PeerDirectory: Send + Sync {
    fn register(&self, peer: PeerId);
    fn deregister(&self, peer: &PeerId);
    /// Registered addresses in sorted order.
    fn registered_peer_ids(&self) -> Vec<PeerId>;
}

/// In-process directory shared between agents, for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct SharedDirectory {
    peers: Arc<Mutex<BTreeSet<PeerId>>>,
}

impl SharedDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerDirectory for SharedDirectory {
    fn register(&self, peer: PeerId) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.insert(peer);
        }
    }

    fn deregister(&self, peer: &PeerId) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.remove(peer);
        }
    }

    fn registered_peer_ids(&self) -> Vec<PeerId> {
        match self.peers.lock() {
            Ok(peers) => peers.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

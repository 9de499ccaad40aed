//! Known-peer tracking with TTL eviction, and merge-master election.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use rdfmesh_core::{AuthorId, RevisionHash};

/// Routable address of a peer on the transport.
///
/// Distinct from [`AuthorId`]: the address is where envelopes go, the
/// author identity is who signs revisions. Ordering is lexicographic and
/// drives merge-master election.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last-observed state of one remote peer.
#[derive(Debug, Clone)]
pub struct KnownPeer {
    pub uuid: AuthorId,
    pub latest_revision: Option<RevisionHash>,
    pub status: String,
    pub last_seen: Instant,
}

/// The peers this agent has heard from recently.
///
/// Entries refresh on every status announcement and expire after a TTL of
/// silence. BTreeMap keeps iteration order deterministic.
#[derive(Debug, Default)]
pub struct KnownPeers {
    peers: BTreeMap<PeerId, KnownPeer>,
}

impl KnownPeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) a peer from a status announcement.
    pub fn observe(
        &mut self,
        id: PeerId,
        uuid: AuthorId,
        latest_revision: Option<RevisionHash>,
        status: String,
        now: Instant,
    ) {
        self.peers.insert(
            id,
            KnownPeer {
                uuid,
                latest_revision,
                status,
                last_seen: now,
            },
        );
    }

    pub fn get(&self, id: &PeerId) -> Option<&KnownPeer> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Peer addresses in sorted order.
    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    /// Author identities of all known peers.
    pub fn uuids(&self) -> Vec<AuthorId> {
        self.peers.values().map(|p| p.uuid.clone()).collect()
    }

    /// Drop every peer not heard from within `ttl` of `now`; returns the
    /// evicted addresses.
    pub fn evict_expired(&mut self, ttl: Duration, now: Instant) -> Vec<PeerId> {
        let expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.duration_since(peer.last_seen) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.peers.remove(id);
        }
        expired
    }
}

/// Elect the merge master: the lexicographically smallest address among
/// the local peer and every known peer.
///
/// Deterministic given the same membership view, so peers converge on the
/// same master without coordination.
pub fn elect_merge_master(local: &PeerId, known: &KnownPeers) -> PeerId {
    known
        .peers
        .keys()
        .chain(std::iter::once(local))
        .min()
        .unwrap_or(local)
        .clone()
}

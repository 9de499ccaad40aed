//! In-memory log of protocol events, for observability and tests.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rdfmesh_core::RevisionHash;

use crate::peers::PeerId;

/// One notable protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    StatusSent { to: PeerId },
    RevisionSent { to: PeerId, hash: RevisionHash },
    RequestSent { to: PeerId, hash: RevisionHash },
    FragmentApplied { description: String },
    RevisionAppended { hash: RevisionHash },
    MergeCreated { hash: RevisionHash },
    RebasePerformed { relinked: usize },
    PeerLost { peer: PeerId },
    MasterElected { peer: PeerId },
}

/// Append-only event log with timestamps (unix milliseconds).
///
/// Tests drain it to assert on protocol behavior; a deployment could
/// periodically flush it to durable storage instead.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Mutex<Vec<(i64, ChangeEvent)>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: ChangeEvent) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((now, event));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every recorded event, oldest first.
    pub fn drain(&self) -> Vec<(i64, ChangeEvent)> {
        match self.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

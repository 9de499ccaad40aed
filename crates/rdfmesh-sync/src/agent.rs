//! The protocol agent: one peer's gossip state machine.
//!
//! An agent owns a [`Document`] replica and drives three activities:
//! periodic status announcements to every directory member, periodic local
//! edits, and reaction to inbound envelopes (statuses, revisions, revision
//! requests). Merge authority is held by a single elected peer, the merge
//! master; everyone else appends or rebases.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use rdfmesh_core::{AuthorId, Document, DocumentError, EditSource, Revision};

use crate::changelog::{ChangeEvent, ChangeLog};
use crate::config::AgentConfig;
use crate::directory::PeerDirectory;
use crate::error::Result;
use crate::messages::{Envelope, PeerMessage, RequestBody, StatusBody};
use crate::peers::{elect_merge_master, KnownPeers, PeerId};
use crate::transport::Transport;

/// Liveness tag carried in status announcements.
const STATUS_AVAILABLE: &str = "available";

/// Mutable agent state, shared with observers.
///
/// The lock is never held across a transport await: handlers mutate state,
/// collect outbound messages, release, then send.
struct AgentState {
    doc: Document,
    known_peers: KnownPeers,
    merge_master: PeerId,
}

/// One peer of the replication mesh.
pub struct Agent<T, E, D>
where
    T: Transport,
    E: EditSource,
    D: PeerDirectory,
{
    id: PeerId,
    uuid: AuthorId,
    config: AgentConfig,
    transport: T,
    edits: E,
    directory: D,
    state: Arc<Mutex<AgentState>>,
    changelog: Arc<ChangeLog>,
}

impl<T, E, D> Agent<T, E, D>
where
    T: Transport,
    E: EditSource,
    D: PeerDirectory,
{
    /// Create an agent with a freshly generated author identity and
    /// register it in the directory.
    pub fn new(transport: T, edits: E, directory: D, config: AgentConfig) -> Self {
        Self::with_author(transport, edits, directory, config, AuthorId::random())
    }

    /// Create an agent with an explicit author identity.
    pub fn with_author(
        transport: T,
        edits: E,
        directory: D,
        config: AgentConfig,
        uuid: AuthorId,
    ) -> Self {
        let id = transport.local_peer_id();
        directory.register(id.clone());
        let state = AgentState {
            doc: Document::new(uuid.clone()),
            known_peers: KnownPeers::new(),
            merge_master: id.clone(),
        };
        Self {
            id,
            uuid,
            config,
            transport,
            edits,
            directory,
            state: Arc::new(Mutex::new(state)),
            changelog: Arc::new(ChangeLog::new()),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn author(&self) -> &AuthorId {
        &self.uuid
    }

    /// A handle for inspecting this agent's state from outside.
    pub fn observer(&self) -> AgentObserver {
        AgentObserver {
            state: Arc::clone(&self.state),
            changelog: Arc::clone(&self.changelog),
        }
    }

    /// Drive the agent until shutdown is signalled or the transport closes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut status_timer = interval(self.config.status_period);
        status_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut edit_timer = interval_at(
            Instant::now() + self.config.edit_start_delay,
            self.config.edit_period,
        );
        edit_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = status_timer.tick() => {
                    if let Err(e) = self.status_round().await {
                        warn!(agent = %self.id, error = %e, "status round failed");
                    }
                }
                _ = edit_timer.tick() => {
                    if let Err(e) = self.edit_round().await {
                        warn!(agent = %self.id, error = %e, "edit round failed");
                    }
                }
                received = self.transport.recv() => match received {
                    Ok((from, envelope)) => {
                        if let Err(e) = self.handle_envelope(from, envelope).await {
                            warn!(agent = %self.id, error = %e, "envelope handling failed");
                        }
                    }
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        self.directory.deregister(&self.id);
        debug!(agent = %self.id, "agent stopped");
    }

    /// One status round: announce to every directory member, then evict
    /// peers that have gone silent and re-run the election.
    pub async fn status_round(&self) -> Result<()> {
        let (body, targets) = {
            let mut state = self.state.lock().await;

            let expired = state
                .known_peers
                .evict_expired(self.config.peer_ttl, Instant::now());
            for peer in &expired {
                debug!(agent = %self.id, peer = %peer, "peer expired");
                self.directory.deregister(peer);
                self.changelog
                    .record(ChangeEvent::PeerLost { peer: peer.clone() });
            }
            if !expired.is_empty() {
                self.reelect(&mut state);
            }

            let body = StatusBody {
                uuid: self.uuid.clone(),
                latest_revision: state.doc.head(),
                status: STATUS_AVAILABLE.to_owned(),
            };
            let targets: Vec<PeerId> = self
                .directory
                .registered_peer_ids()
                .into_iter()
                .filter(|peer| peer != &self.id)
                .collect();
            (body, targets)
        };

        for peer in targets {
            self.deliver(&peer, PeerMessage::Status(body.clone())).await;
        }
        Ok(())
    }

    /// One edit round: open a new revision, apply the next edit fragment,
    /// and announce the result to every known peer.
    ///
    /// A peer that is not the merge master stays quiet until it holds the
    /// master's bootstrap revision, so all histories share one root. It
    /// also withholds the announcement while it lags behind the master's
    /// last announced head, limiting divergence to one hop.
    pub async fn edit_round(&mut self) -> Result<()> {
        let outbound = {
            let mut state = self.state.lock().await;

            if state.doc.is_empty() && state.merge_master != self.id {
                trace!(agent = %self.id, "waiting for bootstrap revision");
                return Ok(());
            }

            state.doc.new_revision();
            let (op, triple) = self.edits.next_fragment(state.doc.state());
            self.changelog.record(ChangeEvent::FragmentApplied {
                description: format!("{op} {triple}"),
            });
            state.doc.apply_fragment(op, triple)?;

            if state.merge_master != self.id && !state.known_peers.contains(&state.merge_master) {
                self.reelect(&mut state);
            }
            let master_synced = state.merge_master == self.id
                || state
                    .known_peers
                    .get(&state.merge_master)
                    .and_then(|peer| peer.latest_revision)
                    .map_or(true, |hash| state.doc.contains(&hash));

            if master_synced {
                match state.doc.head_revision() {
                    Some(head) => state
                        .known_peers
                        .ids()
                        .into_iter()
                        .map(|peer| (peer, PeerMessage::Revision(head.clone())))
                        .collect(),
                    None => Vec::new(),
                }
            } else {
                trace!(agent = %self.id, "behind the merge master, holding announcement");
                Vec::new()
            }
        };

        self.deliver_all(outbound).await;
        Ok(())
    }

    /// Handle at most one inbound envelope, waiting up to `idle` for it.
    /// Returns false if the inbox stayed quiet. Lets test drivers step the
    /// protocol one message at a time.
    pub async fn pump(&self, idle: std::time::Duration) -> Result<bool> {
        match self.transport.recv_timeout(idle).await? {
            Some((from, envelope)) => {
                self.handle_envelope(from, envelope).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handle inbound envelopes until the inbox stays quiet for `idle`;
    /// returns how many were handled.
    pub async fn drain(&self, idle: std::time::Duration) -> Result<usize> {
        let mut handled = 0;
        while self.pump(idle).await? {
            handled += 1;
        }
        Ok(handled)
    }

    /// Decode and dispatch one inbound envelope. Undecodable traffic is
    /// dropped quietly.
    pub async fn handle_envelope(&self, from: PeerId, envelope: Envelope) -> Result<()> {
        let message = match PeerMessage::from_envelope(&envelope) {
            Ok(message) => message,
            Err(e) => {
                trace!(agent = %self.id, peer = %from, error = %e, "dropped envelope");
                return Ok(());
            }
        };
        match message {
            PeerMessage::Status(body) => self.handle_status(from, body).await,
            PeerMessage::Revision(revision) => self.handle_revision(from, revision).await,
            PeerMessage::RevisionRequest(body) => self.handle_request(from, body).await,
        }
    }

    /// A status announcement: refresh the sender's entry, re-run the
    /// election, and fetch the sender's head if we do not hold it.
    async fn handle_status(&self, from: PeerId, body: StatusBody) -> Result<()> {
        let outbound = {
            let mut state = self.state.lock().await;
            state.known_peers.observe(
                from.clone(),
                body.uuid,
                body.latest_revision,
                body.status,
                Instant::now(),
            );
            self.reelect(&mut state);

            match body.latest_revision {
                Some(hash) if !state.doc.contains(&hash) => {
                    vec![(from, PeerMessage::RevisionRequest(RequestBody { hash }))]
                }
                _ => Vec::new(),
            }
        };

        self.deliver_all(outbound).await;
        Ok(())
    }

    /// An inbound revision from a known peer.
    ///
    /// Precedence: an incoming merge that supersedes only self-authored
    /// local revisions is rebased onto; otherwise the merge master folds a
    /// diverging revision into a new merge; otherwise it is appended
    /// as-is. Revisions with absent parents are not integrated yet; the
    /// parents are requested and redelivery is left to the gossip cycle.
    async fn handle_revision(&self, from: PeerId, revision: Revision) -> Result<()> {
        let mut outbound: Vec<(PeerId, PeerMessage)> = Vec::new();
        {
            let mut state = self.state.lock().await;
            if !state.known_peers.contains(&from) {
                debug!(agent = %self.id, peer = %from, "revision from unknown peer, dropped");
                return Ok(());
            }
            if state.doc.contains(&revision.hash()) {
                return Ok(()); // redelivery
            }

            let missing: Vec<_> = revision
                .parents()
                .iter()
                .filter(|parent| !state.doc.contains(parent))
                .copied()
                .collect();
            if !missing.is_empty() {
                for hash in missing {
                    outbound.push((from.clone(), PeerMessage::RevisionRequest(RequestBody { hash })));
                }
            } else {
                self.integrate(&mut state, &from, revision, &mut outbound)?;
            }
        }

        self.deliver_all(outbound).await;
        Ok(())
    }

    /// Integrate a parent-complete revision into the local document.
    fn integrate(
        &self,
        state: &mut AgentState,
        from: &PeerId,
        revision: Revision,
        outbound: &mut Vec<(PeerId, PeerMessage)>,
    ) -> Result<()> {
        let peer_ids = state.known_peers.ids();
        let is_master = state.merge_master == self.id;
        let mut handled = false;

        if revision.is_merge() {
            match state.doc.can_rebase(&revision) {
                Ok(true) => {
                    let incoming = revision.hash();
                    let rebased = state.doc.rebase_revision(revision.clone())?;
                    self.changelog
                        .record(ChangeEvent::RevisionAppended { hash: incoming });
                    if !rebased.is_empty() {
                        self.changelog.record(ChangeEvent::RebasePerformed {
                            relinked: rebased.len(),
                        });
                    }
                    for relinked in rebased {
                        for peer in &peer_ids {
                            outbound.push((peer.clone(), PeerMessage::Revision(relinked.clone())));
                        }
                    }
                    handled = true;
                }
                Ok(false) => {}
                Err(DocumentError::MissingRevision(hash)) => {
                    outbound.push((from.clone(), PeerMessage::RevisionRequest(RequestBody { hash })));
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !handled && is_master {
            match state.doc.merge_revision(&revision) {
                Ok(Some(merge)) => {
                    state.doc.append_revision(revision.clone());
                    self.changelog.record(ChangeEvent::RevisionAppended {
                        hash: revision.hash(),
                    });
                    state.doc.append_revision(merge.clone());
                    self.changelog
                        .record(ChangeEvent::MergeCreated { hash: merge.hash() });
                    for peer in &peer_ids {
                        outbound.push((peer.clone(), PeerMessage::Revision(merge.clone())));
                    }
                    handled = true;
                }
                Ok(None) => {} // descendant or bootstrap: plain append below
                Err(DocumentError::MissingRevision(hash)) => {
                    debug!(agent = %self.id, %hash, "merge deferred, ancestry incomplete");
                    outbound.push((from.clone(), PeerMessage::RevisionRequest(RequestBody { hash })));
                    return Ok(());
                }
                Err(DocumentError::NoCommonAncestor) => {
                    error!(agent = %self.id, peer = %from, "incoming revision shares no ancestry with local history");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !handled {
            state.doc.append_revision(revision.clone());
            self.changelog.record(ChangeEvent::RevisionAppended {
                hash: revision.hash(),
            });
        }
        Ok(())
    }

    /// A revision fetch request.
    ///
    /// The master answers every request. A non-master only answers the
    /// master, and only for revisions it authored itself (or whose author
    /// has left the mesh), so the master receives each branch from its
    /// owner exactly once. Responses fan out to every known peer, which
    /// re-seeds peers that missed the original announcement.
    async fn handle_request(&self, from: PeerId, body: RequestBody) -> Result<()> {
        let outbound: Vec<(PeerId, PeerMessage)> = {
            let state = self.state.lock().await;
            if !state.known_peers.contains(&from) {
                debug!(agent = %self.id, peer = %from, "request from unknown peer, dropped");
                return Ok(());
            }
            let Some(revision) = state.doc.revision(&body.hash) else {
                debug!(agent = %self.id, hash = %body.hash, "requested revision not held");
                return Ok(());
            };

            let is_master = state.merge_master == self.id;
            let respond = is_master
                || (from == state.merge_master
                    && (revision.author() == &self.uuid
                        || !state.known_peers.uuids().contains(revision.author())));
            if !respond {
                return Ok(());
            }

            state
                .known_peers
                .ids()
                .into_iter()
                .map(|peer| (peer, PeerMessage::Revision(revision.clone())))
                .collect()
        };

        self.deliver_all(outbound).await;
        Ok(())
    }

    /// Re-run the election against the current membership view.
    fn reelect(&self, state: &mut AgentState) {
        let master = elect_merge_master(&self.id, &state.known_peers);
        if master != state.merge_master {
            debug!(agent = %self.id, master = %master, "merge master elected");
            self.changelog.record(ChangeEvent::MasterElected {
                peer: master.clone(),
            });
            state.merge_master = master;
        }
    }

    /// Best-effort send; delivery failures are logged, not propagated.
    async fn deliver(&self, peer: &PeerId, message: PeerMessage) {
        let event = match &message {
            PeerMessage::Status(_) => ChangeEvent::StatusSent { to: peer.clone() },
            PeerMessage::Revision(revision) => ChangeEvent::RevisionSent {
                to: peer.clone(),
                hash: revision.hash(),
            },
            PeerMessage::RevisionRequest(body) => ChangeEvent::RequestSent {
                to: peer.clone(),
                hash: body.hash,
            },
        };
        let envelope = match message.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(agent = %self.id, error = %e, "message encoding failed");
                return;
            }
        };
        match self.transport.send(peer, envelope).await {
            Ok(()) => self.changelog.record(event),
            Err(e) => warn!(agent = %self.id, peer = %peer, error = %e, "delivery failed"),
        }
    }

    async fn deliver_all(&self, outbound: Vec<(PeerId, PeerMessage)>) {
        for (peer, message) in outbound {
            self.deliver(&peer, message).await;
        }
    }
}

/// Read-only handle onto a running agent's state.
#[derive(Clone)]
pub struct AgentObserver {
    state: Arc<Mutex<AgentState>>,
    changelog: Arc<ChangeLog>,
}

impl AgentObserver {
    /// Snapshot of the document replica.
    pub async fn document(&self) -> Document {
        self.state.lock().await.doc.clone()
    }

    pub async fn merge_master(&self) -> PeerId {
        self.state.lock().await.merge_master.clone()
    }

    pub async fn known_peer_ids(&self) -> Vec<PeerId> {
        self.state.lock().await.known_peers.ids()
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }
}

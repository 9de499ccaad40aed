//! End-to-end convergence tests: agents driven step by step over the
//! in-memory transport, with every delivery order pinned down.

use std::time::Duration;

use rdfmesh_core::{AuthorId, FragmentOp, Triple};
use rdfmesh_sync::transport::memory::{MemoryNetwork, MemoryTransport};
use rdfmesh_sync::{
    Agent, AgentConfig, ChangeEvent, PeerDirectory, PeerId, SharedDirectory,
};
use rdfmesh_testkit::ScriptedEdits;

const IDLE: Duration = Duration::from_millis(25);

type TestAgent = Agent<MemoryTransport, ScriptedEdits, SharedDirectory>;

async fn agent(
    network: &std::sync::Arc<MemoryNetwork>,
    directory: &SharedDirectory,
    id: &str,
    author: &str,
    edits: Vec<(FragmentOp, Triple)>,
) -> TestAgent {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let transport = network.create_transport(PeerId::from(id)).await;
    Agent::with_author(
        transport,
        ScriptedEdits::new(edits),
        directory.clone(),
        AgentConfig::default(),
        AuthorId::from(author),
    )
}

/// Exchange statuses and drain both inboxes until nothing moves.
async fn settle(a: &TestAgent, b: &TestAgent) {
    for _ in 0..8 {
        a.status_round().await.unwrap();
        b.status_round().await.unwrap();
        loop {
            let moved = a.drain(IDLE).await.unwrap() + b.drain(IDLE).await.unwrap();
            if moved == 0 {
                break;
            }
        }
        let head_a = a.observer().document().await.head();
        let head_b = b.observer().document().await.head();
        if head_a == head_b {
            return;
        }
    }
    panic!("agents failed to converge");
}

fn add(s: &str, p: &str, o: &str) -> (FragmentOp, Triple) {
    (FragmentOp::Add, Triple::new(s, p, o))
}

#[tokio::test]
async fn divergent_edits_converge_through_master_merge() {
    let network = MemoryNetwork::new();
    let directory = SharedDirectory::new();

    let mut a = agent(
        &network,
        &directory,
        "agent-1",
        "author-a",
        vec![add("E0", "P0", "E1"), add("E1", "P1", "E2")],
    )
    .await;
    let mut b = agent(
        &network,
        &directory,
        "agent-2",
        "author-b",
        vec![add("E1", "P1", "E3")],
    )
    .await;

    // Mutual discovery; agent-1 wins the election on both sides.
    a.status_round().await.unwrap();
    b.status_round().await.unwrap();
    a.drain(IDLE).await.unwrap();
    b.drain(IDLE).await.unwrap();
    assert_eq!(a.observer().merge_master().await, PeerId::from("agent-1"));
    assert_eq!(b.observer().merge_master().await, PeerId::from("agent-1"));

    // The master bootstraps the shared history.
    a.edit_round().await.unwrap();
    b.drain(IDLE).await.unwrap();
    let root = a.observer().document().await.head();
    assert_eq!(b.observer().document().await.head(), root);

    // Both sides learn each other's heads.
    a.status_round().await.unwrap();
    b.status_round().await.unwrap();
    a.drain(IDLE).await.unwrap();
    b.drain(IDLE).await.unwrap();

    // Both edit on the same root: divergence.
    b.edit_round().await.unwrap();
    a.edit_round().await.unwrap();

    // The master folds the incoming branch into a merge and announces it.
    a.drain(IDLE).await.unwrap();
    let doc_a = a.observer().document().await;
    let head = doc_a.head_revision().cloned().unwrap();
    assert!(head.is_merge());
    assert_eq!(doc_a.state().len(), 3);

    // The non-master appends the master's branch and fast-forwards onto
    // the merge.
    b.drain(IDLE).await.unwrap();
    let doc_b = b.observer().document().await;
    assert_eq!(doc_b.head(), doc_a.head());
    assert_eq!(doc_b.state(), doc_a.state());
    assert_eq!(*doc_a.state(), doc_a.replayed_state().unwrap());
    assert_eq!(*doc_b.state(), doc_b.replayed_state().unwrap());

    let merges: Vec<_> = a
        .observer()
        .changelog()
        .drain()
        .into_iter()
        .filter(|(_, e)| matches!(e, ChangeEvent::MergeCreated { .. }))
        .collect();
    assert_eq!(merges.len(), 1);
}

#[tokio::test]
async fn late_joiner_backfills_history_via_requests() {
    let network = MemoryNetwork::new();
    let directory = SharedDirectory::new();

    let mut a = agent(
        &network,
        &directory,
        "agent-1",
        "author-a",
        vec![add("E0", "P0", "E1"), add("E1", "P1", "E2")],
    )
    .await;

    // Two revisions before anyone else exists.
    a.edit_round().await.unwrap();
    a.edit_round().await.unwrap();
    let head = a.observer().document().await.head();

    let c = agent(&network, &directory, "agent-9", "author-c", Vec::new()).await;

    // Discovery: the joiner requests the announced head, finds its parent
    // missing, and walks the ancestry backwards one request at a time.
    c.status_round().await.unwrap();
    a.drain(IDLE).await.unwrap();
    a.status_round().await.unwrap();
    c.drain(IDLE).await.unwrap(); // request head
    a.drain(IDLE).await.unwrap(); // respond with head
    c.drain(IDLE).await.unwrap(); // parent missing: request it
    a.drain(IDLE).await.unwrap(); // respond with the root
    c.drain(IDLE).await.unwrap(); // append the root

    let doc_c = c.observer().document().await;
    assert_eq!(doc_c.revision_count(), 1);
    assert_ne!(doc_c.head(), head);

    // The next gossip cycle re-requests the head, now integrable.
    a.status_round().await.unwrap();
    c.drain(IDLE).await.unwrap();
    a.drain(IDLE).await.unwrap();
    c.drain(IDLE).await.unwrap();

    let doc_a = a.observer().document().await;
    let doc_c = c.observer().document().await;
    assert_eq!(doc_c.head(), doc_a.head());
    assert_eq!(doc_c.state(), doc_a.state());
}

#[tokio::test]
async fn racing_local_edit_is_rebased_onto_the_masters_merge() {
    let network = MemoryNetwork::new();
    let directory = SharedDirectory::new();

    let mut a = agent(
        &network,
        &directory,
        "agent-1",
        "author-a",
        vec![add("E0", "P0", "E1"), add("E1", "P1", "E2")],
    )
    .await;
    let mut b = agent(
        &network,
        &directory,
        "agent-2",
        "author-b",
        vec![add("E1", "P1", "E3"), add("E2", "P2", "E4")],
    )
    .await;

    // Bootstrap and mutual head knowledge.
    a.status_round().await.unwrap();
    b.status_round().await.unwrap();
    a.drain(IDLE).await.unwrap();
    b.drain(IDLE).await.unwrap();
    a.edit_round().await.unwrap();
    b.drain(IDLE).await.unwrap();
    a.status_round().await.unwrap();
    b.status_round().await.unwrap();
    a.drain(IDLE).await.unwrap();
    b.drain(IDLE).await.unwrap();

    // Divergence: both edit on the root.
    b.edit_round().await.unwrap();
    a.edit_round().await.unwrap();

    // The non-master takes the master's branch, then edits again on top of
    // it before the master's merge can arrive.
    b.pump(IDLE).await.unwrap();
    b.edit_round().await.unwrap();

    // The master merges the first raced edit and then the second.
    a.drain(IDLE).await.unwrap();

    // The merge reaches the non-master while its head is a self-authored
    // revision the merge does not cover: rebase, not append.
    b.drain(IDLE).await.unwrap();
    let relinks: Vec<usize> = b
        .observer()
        .changelog()
        .drain()
        .into_iter()
        .filter_map(|(_, e)| match e {
            ChangeEvent::RebasePerformed { relinked } => Some(relinked),
            _ => None,
        })
        .collect();
    assert_eq!(relinks, vec![1]);

    settle(&a, &b).await;
    let doc_a = a.observer().document().await;
    let doc_b = b.observer().document().await;
    assert_eq!(doc_a.head(), doc_b.head());
    assert_eq!(doc_a.state(), doc_b.state());
    assert_eq!(*doc_b.state(), doc_b.replayed_state().unwrap());
}

#[tokio::test]
async fn revisions_from_unknown_peers_are_ignored() {
    let network = MemoryNetwork::new();
    let directory = SharedDirectory::new();

    let a = agent(&network, &directory, "agent-1", "author-a", Vec::new()).await;

    // A transport that never announced itself.
    use rdfmesh_sync::{PeerMessage, Transport};
    let rogue = network.create_transport(PeerId::from("rogue")).await;
    let revision = rdfmesh_core::Revision::new(Vec::new(), AuthorId::from("rogue"));
    let envelope = PeerMessage::Revision(revision).to_envelope().unwrap();
    rogue.send(&PeerId::from("agent-1"), envelope).await.unwrap();

    a.drain(IDLE).await.unwrap();
    assert!(a.observer().document().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_master_is_evicted_and_replaced() {
    let network = MemoryNetwork::new();
    let directory = SharedDirectory::new();

    let a = agent(&network, &directory, "agent-1", "author-a", Vec::new()).await;
    let b = agent(&network, &directory, "agent-2", "author-b", Vec::new()).await;

    a.status_round().await.unwrap();
    b.status_round().await.unwrap();
    a.drain(IDLE).await.unwrap();
    b.drain(IDLE).await.unwrap();
    assert_eq!(b.observer().merge_master().await, PeerId::from("agent-1"));

    // The master goes silent past the TTL.
    tokio::time::advance(Duration::from_secs(11)).await;
    b.status_round().await.unwrap();

    assert!(b.observer().known_peer_ids().await.is_empty());
    assert_eq!(b.observer().merge_master().await, PeerId::from("agent-2"));
    assert_eq!(directory.registered_peer_ids(), vec![PeerId::from("agent-2")]);

    let events: Vec<ChangeEvent> = b
        .observer()
        .changelog()
        .drain()
        .into_iter()
        .map(|(_, e)| e)
        .collect();
    assert!(events.contains(&ChangeEvent::PeerLost {
        peer: PeerId::from("agent-1")
    }));
    assert!(events.contains(&ChangeEvent::MasterElected {
        peer: PeerId::from("agent-2")
    }));
}

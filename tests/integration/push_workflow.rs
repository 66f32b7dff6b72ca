//! The consensus-gated push workflow end to end: a push stays pending
//! until a peer's vote gossips back, then certifies and executes.

use std::sync::Arc;
use std::time::Duration;

use keel_consensus::ConsensusEngine;
use keel_engine::PushOrchestrator;
use keel_integration_tests::{ScriptedVcs, open_node, serve_node};
use keel_sync::sync_peer;
use keel_types::{ConsensusConfig, OP_GIT_PUSH, PushStatus, VoteDecision};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn push_waits_for_peer_vote_then_executes() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let b = open_node(dir.path(), "b");
    let members = ConsensusConfig {
        threshold: 0.5,
        members: vec![a.node_id(), b.node_id()],
    };
    a.save_consensus_config(members.clone()).unwrap();
    b.save_consensus_config(members).unwrap();

    let vcs = Arc::new(ScriptedVcs::new("main", "feedbeef"));
    let orchestrator = PushOrchestrator::new(a.clone(), vcs.clone());

    // The push proposes, auto-votes yes, and parks in the queue: one yes
    // of two members is not quorum.
    let args = vec!["origin".to_string(), "main".to_string()];
    let outcome = orchestrator.push(&args).unwrap();
    assert!(!outcome.executed());
    assert_eq!(outcome.report.pending, 1);
    assert!(vcs.pushes().is_empty(), "no backend push before quorum");

    let queued = &a.pending().list().unwrap()[0];
    assert_eq!(queued.status, PushStatus::Pending);
    assert!(
        queued
            .last_error
            .as_deref()
            .unwrap()
            .contains("awaiting quorum yes=1/2 required=2")
    );

    // B hears about the proposal, votes yes, and gossip carries the vote
    // back to A.
    let url_a = serve_node(a.clone()).await;
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();
    ConsensusEngine::new(b.clone())
        .cast_vote(&outcome.proposal.proposal_id, VoteDecision::Yes)
        .unwrap();
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();

    // The next pass certifies and runs the push with the original args.
    let report = orchestrator.process_pending(None);
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(vcs.pushes(), vec![args]);

    let entry = &a.pending().list().unwrap()[0];
    assert_eq!(entry.status, PushStatus::Completed);
    assert!(entry.completed_at.is_some());

    // The executed push is recorded and replicates like any other op.
    assert!(
        a.oplog()
            .ops(0)
            .iter()
            .any(|op| op.op_type == OP_GIT_PUSH)
    );
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();
    assert!(
        b.oplog()
            .ops(0)
            .iter()
            .any(|op| op.op_type == OP_GIT_PUSH)
    );
}

#[tokio::test]
async fn reprocessing_is_idempotent_after_completion() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");

    // Single-member quorum: the push executes inside `push` itself.
    let vcs = Arc::new(ScriptedVcs::new("main", "feedbeef"));
    let orchestrator = PushOrchestrator::new(a.clone(), vcs.clone());
    let outcome = orchestrator.push(&[]).unwrap();
    assert!(outcome.executed());
    assert_eq!(vcs.pushes().len(), 1);

    let report = orchestrator.process_pending(None);
    assert_eq!(report.checked, 0);
    assert_eq!(vcs.pushes().len(), 1, "completed entries never re-run");
}

#[tokio::test]
async fn two_pushes_queue_independently() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let absent = keel_types::NodeId::from_public_key(b"absent member");
    a.save_consensus_config(ConsensusConfig {
        threshold: 0.5,
        members: vec![a.node_id(), absent],
    })
    .unwrap();

    let vcs = Arc::new(ScriptedVcs::new("main", "feedbeef"));
    let orchestrator = PushOrchestrator::new(a.clone(), vcs.clone());

    orchestrator.push(&[]).unwrap();
    vcs.set_rev("main", "cafebabe");
    orchestrator.push(&[]).unwrap();

    let queue = a.pending().list().unwrap();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|p| p.status == PushStatus::Pending));

    let report = orchestrator.process_pending(None);
    assert_eq!(report.checked, 2);
    assert_eq!(report.pending, 2);
    assert!(vcs.pushes().is_empty());
}

//! Proposal / vote / certification across two gossiping nodes.

use std::time::Duration;

use keel_consensus::{ConsensusEngine, ProposeRefInput};
use keel_integration_tests::{open_node, serve_node};
use keel_sync::sync_peer;
use keel_types::{ConsensusConfig, VoteDecision};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn proposal_gossips_votes_and_certifies() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let b = open_node(dir.path(), "b");
    let members = ConsensusConfig {
        threshold: 0.5,
        members: vec![a.node_id(), b.node_id()],
    };
    a.save_consensus_config(members.clone()).unwrap();
    b.save_consensus_config(members).unwrap();

    let engine_a = ConsensusEngine::new(a.clone());
    let engine_b = ConsensusEngine::new(b.clone());

    let (_, proposal) = engine_a
        .propose_ref_update(ProposeRefInput {
            proposal_id: None,
            ref_name: "refs/heads/main".into(),
            old_oid: "1111111".into(),
            new_oid: "2222222".into(),
            epoch: 0,
            ttl: Duration::from_secs(3600),
        })
        .unwrap();
    engine_a
        .cast_vote(&proposal.proposal_id, VoteDecision::Yes)
        .unwrap();

    // B learns the proposal over the wire and votes yes.
    let url_a = serve_node(a.clone()).await;
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();
    let status_b = engine_b.status(&proposal.proposal_id).unwrap();
    assert!(!status_b.certified);
    assert_eq!(status_b.yes_voters.len(), 1, "only A's vote so far");

    engine_b
        .cast_vote(&proposal.proposal_id, VoteDecision::Yes)
        .unwrap();
    // The vote flows back to A through the same anti-entropy exchange.
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();

    let status_a = engine_a.status(&proposal.proposal_id).unwrap();
    assert!(status_a.has_quorum);
    assert_eq!(status_a.yes_voters.len(), 2);

    let (cert_op, cert) = engine_a.certify(&proposal.proposal_id, false).unwrap();
    assert!(cert.certified);

    // After one more exchange, B sees the certification too.
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();
    let status_b = engine_b.status(&proposal.proposal_id).unwrap();
    assert!(status_b.certified);
    assert_eq!(status_b.certified_op_id, Some(cert_op.id));
}

#[tokio::test]
async fn tallies_agree_on_both_peers() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let b = open_node(dir.path(), "b");
    let members = ConsensusConfig {
        threshold: 0.5,
        members: vec![a.node_id(), b.node_id()],
    };
    a.save_consensus_config(members.clone()).unwrap();
    b.save_consensus_config(members).unwrap();

    let engine_a = ConsensusEngine::new(a.clone());
    let engine_b = ConsensusEngine::new(b.clone());

    let (_, proposal) = engine_a
        .propose_ref_update(ProposeRefInput {
            proposal_id: Some("shared".into()),
            ref_name: "refs/heads/main".into(),
            old_oid: String::new(),
            new_oid: "abc".into(),
            epoch: 0,
            ttl: Duration::from_secs(3600),
        })
        .unwrap();

    let url_a = serve_node(a.clone()).await;
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();

    // B changes its mind: no, then yes. Latest vote wins everywhere.
    engine_b
        .cast_vote(&proposal.proposal_id, VoteDecision::No)
        .unwrap();
    engine_b
        .cast_vote(&proposal.proposal_id, VoteDecision::Yes)
        .unwrap();
    sync_peer(&b, &url_a, 16, 6, TIMEOUT).await.unwrap();

    let status_a = engine_a.status("shared").unwrap();
    let status_b = engine_b.status("shared").unwrap();
    assert_eq!(status_a.yes_voters, status_b.yes_voters);
    assert_eq!(status_a.no_voters, status_b.no_voters);
    assert_eq!(status_a.yes_voters, vec![b.node_id()]);
    assert!(status_a.no_voters.is_empty());
}

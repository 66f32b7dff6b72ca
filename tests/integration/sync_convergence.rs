//! Anti-entropy convergence across real HTTP servers.

use std::time::Duration;

use keel_integration_tests::{open_node, serve_node};
use keel_sync::{SyncClient, sync_peer};
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn two_nodes_converge_to_the_union() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let b = open_node(dir.path(), "b");

    for i in 0..4 {
        a.oplog().append_local("git.commit", &json!({"n": i})).unwrap();
    }
    for i in 0..7 {
        b.oplog().append_local("git.commit", &json!({"n": i})).unwrap();
    }

    let url_b = serve_node(b.clone()).await;
    let stats = sync_peer(&a, &url_b, 3, 8, TIMEOUT).await.unwrap();

    assert_eq!(stats.sent, 4);
    assert_eq!(stats.accepted, 7);
    assert_eq!(a.oplog().len(), 11);
    assert_eq!(b.oplog().len(), 11);
    assert_eq!(a.oplog().summary(), b.oplog().summary());
}

#[tokio::test]
async fn three_nodes_converge_through_a_hub() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let hub = open_node(dir.path(), "hub");
    let c = open_node(dir.path(), "c");

    a.oplog().append_local("note", &json!({"from": "a"})).unwrap();
    c.oplog().append_local("note", &json!({"from": "c"})).unwrap();

    let hub_url = serve_node(hub.clone()).await;
    sync_peer(&a, &hub_url, 16, 6, TIMEOUT).await.unwrap();
    sync_peer(&c, &hub_url, 16, 6, TIMEOUT).await.unwrap();
    // A second pass gives A what C contributed after A's first visit.
    sync_peer(&a, &hub_url, 16, 6, TIMEOUT).await.unwrap();

    assert_eq!(a.oplog().len(), 2);
    assert_eq!(hub.oplog().len(), 2);
    assert_eq!(c.oplog().len(), 2);
    assert_eq!(a.oplog().summary(), c.oplog().summary());
}

#[tokio::test]
async fn tampered_op_is_rejected_by_the_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let b = open_node(dir.path(), "b");

    let op = a
        .oplog()
        .append_local("git.commit", &json!({"hash": "abc"}))
        .unwrap();
    let mut tampered = op;
    tampered.payload = serde_json::value::to_raw_value(&json!({"hash": "tampered"})).unwrap();

    let url_b = serve_node(b.clone()).await;
    let client = SyncClient::new(&url_b, TIMEOUT).unwrap();
    let tally = client.push_ops(&[tampered]).await.unwrap();

    assert_eq!(tally.rejected, 1);
    assert_eq!(tally.accepted, 0);
    assert!(b.oplog().is_empty());
}

#[tokio::test]
async fn synced_ops_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    {
        let b = open_node(dir.path(), "b");
        for i in 0..3 {
            b.oplog().append_local("note", &json!({"n": i})).unwrap();
        }
        let url_b = serve_node(b).await;
        sync_peer(&a, &url_b, 16, 6, TIMEOUT).await.unwrap();
        assert_eq!(a.oplog().len(), 3);
    }
    drop(a);

    // Reopen A from disk: the replicated ops and identity are durable.
    let reopened = open_node(dir.path(), "a");
    assert_eq!(reopened.oplog().len(), 3);
}

#[tokio::test]
async fn small_limit_still_converges() {
    let dir = tempfile::tempdir().unwrap();
    let a = open_node(dir.path(), "a");
    let b = open_node(dir.path(), "b");

    for i in 0..10 {
        b.oplog().append_local("note", &json!({"n": i})).unwrap();
    }

    let url_b = serve_node(b.clone()).await;
    // Pull limit of 2 per round forces multiple rounds.
    let stats = sync_peer(&a, &url_b, 2, 20, TIMEOUT).await.unwrap();

    assert_eq!(a.oplog().len(), 10);
    assert!(stats.rounds > 1);
    assert_eq!(stats.accepted, 10);
}

//! Client-side anti-entropy: bounded push/pull rounds against peers.

use std::time::Duration;

use keel_store::Store;
use tracing::{debug, info, warn};

use crate::client::SyncClient;
use crate::error::SyncError;

/// Counters from one [`sync_peer`] run.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub peer: String,
    /// Rounds executed (including the final empty one).
    pub rounds: usize,
    /// Operations pushed to the peer.
    pub sent: u64,
    /// Operations received from the peer.
    pub pulled: u64,
    /// Received operations newly ingested.
    pub accepted: u64,
    /// Received operations that failed verification or conflicted.
    pub rejected: u64,
    /// Received operations already known (duplicates).
    pub dropped: u64,
}

/// Run anti-entropy against a single peer.
///
/// Each round pushes the peer's missing operations (in batches of `limit`)
/// and then pulls what this store is missing, feeding every received op
/// through the log's verification. The loop stops after `max_rounds`, or
/// after a round in which nothing moved in either direction. HTTP failures
/// abort and surface as the error; rejected operations do not.
///
/// Cancellation is dropping the returned future (e.g. racing it in a
/// `select!`). Operations already ingested stay durable; re-running the
/// sync absorbs them as duplicates.
pub async fn sync_peer(
    store: &Store,
    peer_url: &str,
    limit: usize,
    max_rounds: usize,
    timeout: Duration,
) -> Result<SyncStats, SyncError> {
    let client = SyncClient::new(peer_url, timeout)?;
    let mut stats = SyncStats {
        peer: peer_url.to_string(),
        ..SyncStats::default()
    };

    for _ in 0..max_rounds.max(1) {
        stats.rounds += 1;
        let mut moved = 0u64;

        // Push what the peer is missing.
        let remote_summary = client.summary().await?;
        let outgoing = store.oplog().missing_for(&remote_summary, 0);
        let batch = if limit > 0 { limit } else { outgoing.len().max(1) };
        for chunk in outgoing.chunks(batch) {
            client.push_ops(chunk).await?;
            stats.sent += chunk.len() as u64;
            moved += chunk.len() as u64;
        }

        // Pull what this store is missing.
        let local_summary = store.oplog().summary();
        let incoming = client.missing(&local_summary, limit).await?;
        stats.pulled += incoming.len() as u64;
        moved += incoming.len() as u64;
        for op in incoming {
            let op_id = op.id;
            match store.oplog().add_remote(op) {
                Ok(true) => stats.accepted += 1,
                Ok(false) => stats.dropped += 1,
                Err(e) => {
                    stats.rejected += 1;
                    warn!(peer = peer_url, op_id = %op_id, %e, "rejected op from peer");
                }
            }
        }

        if moved == 0 {
            break;
        }
        debug!(
            peer = peer_url,
            round = stats.rounds,
            moved, "anti-entropy round exchanged ops"
        );
    }

    Ok(stats)
}

/// Outcome of a [`sync_all`] pass over the peer registry.
#[derive(Debug, Default)]
pub struct SyncAllReport {
    pub stats: Vec<SyncStats>,
    /// Peers that failed, in registry order.
    pub failures: Vec<(String, SyncError)>,
}

impl SyncAllReport {
    /// The first per-peer failure, if any.
    pub fn first_error(&self) -> Option<&SyncError> {
        self.failures.first().map(|(_, e)| e)
    }
}

/// Run [`sync_peer`] against every registered peer.
///
/// A failing peer is logged and skipped; the pass always visits the whole
/// registry.
pub async fn sync_all(
    store: &Store,
    limit: usize,
    max_rounds: usize,
    timeout: Duration,
) -> SyncAllReport {
    let mut report = SyncAllReport::default();
    for peer in store.peers().list() {
        match sync_peer(store, &peer, limit, max_rounds, timeout).await {
            Ok(stats) => {
                info!(
                    peer = %stats.peer,
                    rounds = stats.rounds,
                    sent = stats.sent,
                    pulled = stats.pulled,
                    accepted = stats.accepted,
                    rejected = stats.rejected,
                    dropped = stats.dropped,
                    "peer sync complete"
                );
                report.stats.push(stats);
            }
            Err(e) => {
                warn!(peer = %peer, %e, "peer sync failed");
                report.failures.push((peer, e));
            }
        }
    }
    report
}

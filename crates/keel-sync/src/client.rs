//! HTTP client for a single gossip peer.

use std::collections::BTreeMap;
use std::time::Duration;

use keel_types::{NodeId, Operation};

use crate::error::SyncError;
use crate::wire::{MissingRequest, MissingResponse, PushOpsRequest, PushOpsResponse, SummaryResponse};

/// Typed client for one peer's gossip endpoints.
pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
}

impl SyncClient {
    /// Create a client for `peer_url` with a per-request timeout.
    pub fn new(peer_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: peer_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the peer's author → max sequence summary.
    pub async fn summary(&self) -> Result<BTreeMap<NodeId, u64>, SyncError> {
        let response = self
            .http
            .get(format!("{}/gossip/summary", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<SummaryResponse>().await?.summary)
    }

    /// Ask the peer for operations missing from the given summary.
    pub async fn missing(
        &self,
        summary: &BTreeMap<NodeId, u64>,
        limit: usize,
    ) -> Result<Vec<Operation>, SyncError> {
        let response = self
            .http
            .post(format!("{}/gossip/missing", self.base_url))
            .json(&MissingRequest {
                summary: summary.clone(),
                limit,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<MissingResponse>().await?.ops)
    }

    /// Push operations to the peer; returns its ingestion tally.
    pub async fn push_ops(&self, ops: &[Operation]) -> Result<PushOpsResponse, SyncError> {
        let response = self
            .http
            .post(format!("{}/gossip/ops", self.base_url))
            .json(&PushOpsRequest { ops: ops.to_vec() })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

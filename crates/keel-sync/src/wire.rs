//! Wire bodies for the gossip HTTP API.

use std::collections::BTreeMap;

use keel_types::{NodeId, Operation};
use serde::{Deserialize, Serialize};

/// Body of `GET /gossip/summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// Author → highest sequence number known.
    pub summary: BTreeMap<NodeId, u64>,
}

/// Request body of `POST /gossip/missing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingRequest {
    /// The caller's summary; the peer answers with what the caller lacks.
    #[serde(default)]
    pub summary: BTreeMap<NodeId, u64>,
    /// Maximum operations in the response; 0 means unlimited.
    #[serde(default)]
    pub limit: usize,
}

/// Response body of `POST /gossip/missing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingResponse {
    pub ops: Vec<Operation>,
}

/// Request body of `POST /gossip/ops`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOpsRequest {
    pub ops: Vec<Operation>,
}

/// Response body of `POST /gossip/ops`: the peer's ingestion tally.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PushOpsResponse {
    /// Newly ingested.
    pub accepted: u64,
    /// Failed verification or conflicted.
    pub rejected: u64,
    /// Already known (duplicate id).
    pub dropped: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub node_id: NodeId,
}

//! Consensus configuration and the reserved consensus payload documents.

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Default quorum threshold when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Persistent consensus configuration for a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Quorum threshold in `[0, 1)`. A proposal has quorum when the yes
    /// ratio is strictly greater than this value.
    pub threshold: f64,
    /// Explicit membership, sorted and unique.
    ///
    /// When empty, membership is auto-discovered as the set of authors
    /// observed in the local log. That set depends on which operations a
    /// peer has ingested, so it is not reproducible across peers with
    /// different views; configure explicit members for production use.
    #[serde(default)]
    pub members: Vec<NodeId>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            members: Vec::new(),
        }
    }
}

/// A vote decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDecision {
    Yes,
    No,
}

impl VoteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDecision::Yes => "yes",
            VoteDecision::No => "no",
        }
    }
}

/// Payload of a `consensus.proposal` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalPayload {
    /// Identifier voters and certs refer to.
    pub proposal_id: String,
    /// Fully-qualified ref being updated (e.g. `refs/heads/main`).
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Object id the ref currently points at; may be empty for a new ref.
    pub old_oid: String,
    /// Proposed new object id.
    pub new_oid: String,
    /// Membership epoch the proposal was made under. Votes from other
    /// epochs are not counted.
    pub epoch: u64,
    /// RFC 3339 expiry, computed from the proposer's clock. No skew bound
    /// is enforced between peers.
    pub expires_at: String,
}

/// Payload of a `consensus.vote` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotePayload {
    pub proposal_id: String,
    /// Copied from the proposal at vote time.
    pub epoch: u64,
    pub decision: VoteDecision,
}

/// Payload of a `consensus.cert` operation: a snapshot of the tally at the
/// moment of certification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertPayload {
    pub proposal_id: String,
    pub epoch: u64,
    pub threshold: f64,
    pub members: Vec<NodeId>,
    pub yes_voters: Vec<NodeId>,
    pub no_voters: Vec<NodeId>,
    pub required_yes: u64,
    pub total_voters: u64,
    /// Whether quorum was actually reached. A forced certification records
    /// `false` here, keeping the override auditable.
    pub certified: bool,
}

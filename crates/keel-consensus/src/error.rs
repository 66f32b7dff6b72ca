//! Error types for the consensus crate.

use keel_store::StoreError;

/// Errors produced by the consensus engine.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// A proposal needs a target ref.
    #[error("ref is required")]
    RefRequired,

    /// A proposal needs a new object id.
    #[error("new oid is required")]
    NewOidRequired,

    /// The proposal TTL does not fit the timestamp range.
    #[error("proposal ttl is out of range")]
    InvalidTtl,

    /// No proposal operation with this id exists in the log.
    #[error("proposal {0} not found")]
    ProposalNotFound(String),

    /// The proposal's expiry has passed.
    #[error("proposal {0} has expired")]
    ProposalExpired(String),

    /// A certification already exists for this proposal.
    #[error("proposal {0} is already certified")]
    AlreadyCertified(String),

    /// Not enough yes votes for a non-forced certification.
    #[error("proposal {proposal_id} lacks quorum: yes={yes} required={required}")]
    NoQuorum {
        proposal_id: String,
        yes: usize,
        required: usize,
    },

    /// The proposal carries an unparseable expiry timestamp.
    #[error("invalid proposal expiry: {0}")]
    InvalidExpiry(#[source] chrono::ParseError),

    /// An error from the underlying store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A reserved payload failed to encode or decode.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

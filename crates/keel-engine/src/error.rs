//! Error types for the engine crate.

use keel_consensus::ConsensusError;
use keel_store::StoreError;

/// Errors produced by push resolution and orchestration.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// HEAD is not on a branch; an auto-proposal push needs one.
    #[error("push requires a branch checkout (detached HEAD)")]
    DetachedHead,

    /// No remote could be determined from arguments or upstream.
    #[error("could not determine push remote")]
    NoRemote,

    /// The source ref did not resolve to an object id.
    #[error("could not resolve source ref {0:?} for push")]
    UnresolvedSource(String),

    /// No target ref could be derived for the push.
    #[error("could not resolve target ref for push")]
    UnresolvedTarget,

    /// A failure reported by the VCS backend.
    #[error("vcs backend error: {0}")]
    Backend(String),

    /// An error from the store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An error from the consensus engine.
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

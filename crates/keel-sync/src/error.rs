//! Error types for the sync crate.

use keel_store::StoreError;

/// Errors produced by the sync protocol.
///
/// HTTP-level failures abort a sync round; per-operation verification
/// failures do not, they are tallied as `rejected` in the stats instead.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport failure, non-success status, or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An error from the local store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

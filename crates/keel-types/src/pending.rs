//! Durable push-intent records.

use serde::{Deserialize, Serialize};

/// Status of a pending push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    /// Waiting for quorum or a retry.
    Pending,
    /// The last attempt failed; `last_error` records why.
    Failed,
    /// The backend push succeeded.
    Completed,
}

impl PushStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushStatus::Pending => "pending",
            PushStatus::Failed => "failed",
            PushStatus::Completed => "completed",
        }
    }
}

/// A push intent tracked until its proposal is certified and the external
/// push has run.
///
/// Keyed by `proposal_id`. `attempts` is monotonically non-decreasing
/// across updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPush {
    pub proposal_id: String,
    pub remote: String,
    pub source_ref: String,
    pub target_ref: String,
    pub new_oid: String,
    /// The caller's original push arguments, replayed verbatim on execute.
    pub git_args: Vec<String>,
    pub status: PushStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tried_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

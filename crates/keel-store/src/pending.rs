//! Durable queue of push intents awaiting certification.
//!
//! The JSON file is the source of truth: every operation reloads it under
//! the lock, mutates, and writes it back atomically. The queue is small
//! (one entry per in-flight proposal) and this keeps crash recovery
//! trivial.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use keel_types::{PendingPush, PushStatus, now_rfc3339};
use serde::{Deserialize, Serialize};

use crate::atomic::write_json_atomic;
use crate::error::StoreError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingFile {
    pushes: Vec<PendingPush>,
}

/// Persistent pending-push queue, keyed by proposal id.
pub struct PendingPushQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PendingPushQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// All tracked pushes, sorted by creation time then proposal id.
    pub fn list(&self) -> Result<Vec<PendingPush>, StoreError> {
        let _guard = self.lock.lock().expect("pending queue lock poisoned");
        self.load_locked()
    }

    /// Insert or replace the push for its proposal id.
    ///
    /// On replace, `created_at` is retained and `attempts` never decreases;
    /// all other fields are overwritten and `updated_at` is refreshed.
    pub fn upsert(&self, push: PendingPush) -> Result<PendingPush, StoreError> {
        let _guard = self.lock.lock().expect("pending queue lock poisoned");
        let mut push = normalize(push, true)?;
        let mut pushes = self.load_locked()?;

        if let Some(existing) = pushes
            .iter_mut()
            .find(|existing| existing.proposal_id == push.proposal_id)
        {
            push.created_at = existing.created_at.clone();
            push.attempts = push.attempts.max(existing.attempts);
            *existing = push.clone();
        } else {
            pushes.push(push.clone());
        }

        self.save_locked(pushes)?;
        Ok(push)
    }

    /// Mark a push as still waiting (e.g. for quorum), recording why.
    pub fn mark_pending(&self, proposal_id: &str, message: &str) -> Result<(), StoreError> {
        self.update_status(proposal_id, PushStatus::Pending, Some(message))
    }

    /// Mark a push as failed, recording the error.
    pub fn mark_failed(&self, proposal_id: &str, message: &str) -> Result<(), StoreError> {
        self.update_status(proposal_id, PushStatus::Failed, Some(message))
    }

    /// Mark a push as successfully applied.
    pub fn mark_completed(&self, proposal_id: &str) -> Result<(), StoreError> {
        self.update_status(proposal_id, PushStatus::Completed, None)
    }

    fn update_status(
        &self,
        proposal_id: &str,
        status: PushStatus,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let proposal_id = proposal_id.trim();
        if proposal_id.is_empty() {
            return Err(StoreError::ProposalIdRequired);
        }

        let _guard = self.lock.lock().expect("pending queue lock poisoned");
        let mut pushes = self.load_locked()?;

        let push = pushes
            .iter_mut()
            .find(|push| push.proposal_id == proposal_id)
            .ok_or_else(|| StoreError::PendingPushNotFound(proposal_id.to_string()))?;

        let now = now_rfc3339();
        push.status = status;
        push.last_error = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from);
        push.updated_at = now.clone();
        push.last_tried_at = Some(now.clone());
        push.attempts += 1;
        if status == PushStatus::Completed {
            push.completed_at = Some(now);
            push.last_error = None;
        }

        self.save_locked(pushes)
    }

    fn load_locked(&self) -> Result<Vec<PendingPush>, StoreError> {
        let file: PendingFile = match fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PendingFile::default(),
            Err(e) => return Err(e.into()),
        };
        let mut pushes = file
            .pushes
            .into_iter()
            .map(|push| normalize(push, false))
            .collect::<Result<Vec<_>, _>>()?;
        pushes.sort_by(|a, b| {
            (a.created_at.as_str(), a.proposal_id.as_str())
                .cmp(&(b.created_at.as_str(), b.proposal_id.as_str()))
        });
        Ok(pushes)
    }

    fn save_locked(&self, pushes: Vec<PendingPush>) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &PendingFile { pushes }, None)
    }
}

fn normalize(mut push: PendingPush, for_write: bool) -> Result<PendingPush, StoreError> {
    push.proposal_id = push.proposal_id.trim().to_string();
    push.remote = push.remote.trim().to_string();
    push.source_ref = push.source_ref.trim().to_string();
    push.target_ref = push.target_ref.trim().to_string();
    push.new_oid = push.new_oid.trim().to_string();
    push.last_error = push
        .last_error
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    if push.proposal_id.is_empty() {
        return Err(StoreError::ProposalIdRequired);
    }
    if push.target_ref.is_empty() {
        return Err(StoreError::TargetRefRequired);
    }

    if for_write {
        let now = now_rfc3339();
        if push.created_at.trim().is_empty() {
            push.created_at = now.clone();
        }
        push.updated_at = now;
    }
    Ok(push)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(proposal_id: &str) -> PendingPush {
        PendingPush {
            proposal_id: proposal_id.to_string(),
            remote: "origin".into(),
            source_ref: "refs/heads/main".into(),
            target_ref: "refs/heads/main".into(),
            new_oid: "abc123".into(),
            git_args: vec!["origin".into(), "main".into()],
            status: PushStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: String::new(),
            updated_at: String::new(),
            last_tried_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_upsert_insert_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let queue = PendingPushQueue::new(dir.path().join("pending_pushes.json"));

        let first = queue.upsert(sample("p1")).unwrap();
        assert!(!first.created_at.is_empty());

        // Bump attempts through a status update, then replace: attempts and
        // created_at must survive.
        queue.mark_failed("p1", "boom").unwrap();
        let mut replacement = sample("p1");
        replacement.new_oid = "def456".into();
        let replaced = queue.upsert(replacement).unwrap();

        assert_eq!(replaced.created_at, first.created_at);
        assert_eq!(replaced.attempts, 1);
        assert_eq!(replaced.new_oid, "def456");
        assert_eq!(queue.list().unwrap().len(), 1);
    }

    #[test]
    fn test_status_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let queue = PendingPushQueue::new(dir.path().join("pending_pushes.json"));
        queue.upsert(sample("p1")).unwrap();

        queue.mark_pending("p1", "awaiting quorum yes=1/2 required=2").unwrap();
        let push = &queue.list().unwrap()[0];
        assert_eq!(push.status, PushStatus::Pending);
        assert_eq!(push.attempts, 1);
        assert!(push.last_error.as_deref().unwrap().contains("quorum"));
        assert!(push.last_tried_at.is_some());

        queue.mark_failed("p1", "push rejected").unwrap();
        let push = &queue.list().unwrap()[0];
        assert_eq!(push.status, PushStatus::Failed);
        assert_eq!(push.attempts, 2);

        queue.mark_completed("p1").unwrap();
        let push = &queue.list().unwrap()[0];
        assert_eq!(push.status, PushStatus::Completed);
        assert_eq!(push.attempts, 3);
        assert!(push.last_error.is_none());
        assert!(push.completed_at.is_some());
    }

    #[test]
    fn test_unknown_proposal_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let queue = PendingPushQueue::new(dir.path().join("pending_pushes.json"));
        assert!(matches!(
            queue.mark_completed("missing"),
            Err(StoreError::PendingPushNotFound(_))
        ));
    }

    #[test]
    fn test_normalize_requires_fields() {
        let dir = tempfile::tempdir().unwrap();
        let queue = PendingPushQueue::new(dir.path().join("pending_pushes.json"));

        let mut no_id = sample("p1");
        no_id.proposal_id = "  ".into();
        assert!(matches!(
            queue.upsert(no_id),
            Err(StoreError::ProposalIdRequired)
        ));

        let mut no_target = sample("p1");
        no_target.target_ref = String::new();
        assert!(matches!(
            queue.upsert(no_target),
            Err(StoreError::TargetRefRequired)
        ));
    }

    #[test]
    fn test_list_order_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_pushes.json");
        {
            let queue = PendingPushQueue::new(&path);
            queue.upsert(sample("p2")).unwrap();
            queue.upsert(sample("p1")).unwrap();
        }
        let queue = PendingPushQueue::new(&path);
        let listed = queue.list().unwrap();
        assert_eq!(listed.len(), 2);
        // created_at ascending; p2 was created first.
        assert_eq!(listed[0].proposal_id, "p2");
    }
}

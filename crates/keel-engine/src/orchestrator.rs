//! Drives a push from proposal to quorum to certification to execution.

use std::sync::Arc;
use std::time::Duration;

use keel_consensus::{ConsensusEngine, ConsensusError, ProposeRefInput};
use keel_store::Store;
use keel_types::{
    OP_GIT_PUSH, Operation, PendingPush, ProposalPayload, PushStatus, VoteDecision,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::VcsBackend;
use crate::error::EngineError;
use crate::intent::resolve_push_intent;

/// Proposals created for pushes stay open this long.
const PUSH_PROPOSAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of one [`PushOrchestrator::process_pending`] pass.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Queue entries examined (completed ones are skipped).
    pub checked: usize,
    /// Pushes executed through the backend.
    pub executed: usize,
    /// Entries still awaiting quorum.
    pub pending: usize,
    /// Entries that failed this pass.
    pub failed: usize,
    /// First non-recoverable error encountered; later failures are only
    /// recorded in the queue.
    pub first_error: Option<EngineError>,
}

/// Outcome of [`PushOrchestrator::push`].
#[derive(Debug)]
pub struct PushOutcome {
    pub proposal_op: Operation,
    pub proposal: ProposalPayload,
    pub pending: PendingPush,
    pub report: ProcessReport,
}

impl PushOutcome {
    /// Whether the push already ran (single-node quorum or a fast vote).
    pub fn executed(&self) -> bool {
        self.report.executed > 0
    }
}

/// Payload of the `git.push` event recorded after a certified push runs.
#[derive(Serialize)]
struct PushEventPayload<'a> {
    args: &'a [String],
    proposal_id: &'a str,
    remote: &'a str,
    target_ref: &'a str,
    new_oid: &'a str,
    mode: &'a str,
}

/// Orchestrates consensus-gated pushes over a [`VcsBackend`].
pub struct PushOrchestrator {
    store: Arc<Store>,
    consensus: ConsensusEngine,
    backend: Arc<dyn VcsBackend>,
}

impl PushOrchestrator {
    pub fn new(store: Arc<Store>, backend: Arc<dyn VcsBackend>) -> Self {
        let consensus = ConsensusEngine::new(store.clone());
        Self {
            store,
            consensus,
            backend,
        }
    }

    /// The consensus engine this orchestrator votes and certifies through.
    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    /// Start a consensus-gated push.
    ///
    /// Resolves the intent, proposes the ref update (epoch 0, 24 h TTL),
    /// auto-casts a yes vote, records the durable queue entry with the
    /// original arguments, and immediately tries to process it, so a
    /// single-member configuration pushes in the same call.
    pub fn push(&self, git_args: &[String]) -> Result<PushOutcome, EngineError> {
        let intent = resolve_push_intent(self.backend.as_ref(), git_args)?;

        let (proposal_op, proposal) = self.consensus.propose_ref_update(ProposeRefInput {
            proposal_id: None,
            ref_name: intent.target_ref.clone(),
            old_oid: intent.old_oid.clone(),
            new_oid: intent.new_oid.clone(),
            epoch: 0,
            ttl: PUSH_PROPOSAL_TTL,
        })?;
        self.consensus
            .cast_vote(&proposal.proposal_id, VoteDecision::Yes)?;

        let pending = self.store.pending().upsert(PendingPush {
            proposal_id: proposal.proposal_id.clone(),
            remote: intent.remote,
            source_ref: intent.source_ref,
            target_ref: intent.target_ref,
            new_oid: intent.new_oid,
            git_args: git_args.to_vec(),
            status: PushStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: String::new(),
            updated_at: String::new(),
            last_tried_at: None,
            completed_at: None,
        })?;
        info!(
            proposal_id = %proposal.proposal_id,
            target_ref = %pending.target_ref,
            "queued consensus-gated push"
        );

        let report = self.process_pending(Some(&proposal.proposal_id));
        Ok(PushOutcome {
            proposal_op,
            proposal,
            pending,
            report,
        })
    }

    /// Walk the pending queue (or the one entry named by `only_proposal`),
    /// advancing every non-completed push as far as it can go.
    ///
    /// Per-entry failures are recorded into the queue and do not stop the
    /// pass; only the first error is surfaced in the report.
    pub fn process_pending(&self, only_proposal: Option<&str>) -> ProcessReport {
        let mut report = ProcessReport::default();

        let pushes = match self.store.pending().list() {
            Ok(pushes) => pushes,
            Err(e) => {
                report.first_error = Some(e.into());
                return report;
            }
        };

        for push in pushes {
            if let Some(only) = only_proposal
                && push.proposal_id != only
            {
                continue;
            }
            if push.status == PushStatus::Completed {
                continue;
            }
            report.checked += 1;

            let status = match self.consensus.status(&push.proposal_id) {
                Ok(status) => status,
                Err(e) => {
                    self.fail(&mut report, &push.proposal_id, e.into());
                    continue;
                }
            };

            if status.expired {
                let expired =
                    ConsensusError::ProposalExpired(push.proposal_id.clone());
                self.fail(&mut report, &push.proposal_id, expired.into());
                continue;
            }

            if !status.certified {
                if !status.has_quorum {
                    report.pending += 1;
                    let waiting = format!(
                        "awaiting quorum yes={}/{} required={}",
                        status.yes_voters.len(),
                        status.members.len(),
                        status.required_yes
                    );
                    debug!(proposal_id = %push.proposal_id, %waiting, "push still pending");
                    if let Err(e) = self.store.pending().mark_pending(&push.proposal_id, &waiting)
                    {
                        warn!(proposal_id = %push.proposal_id, %e, "could not update pending push");
                    }
                    continue;
                }
                if let Err(e) = self.consensus.certify(&push.proposal_id, false) {
                    self.fail(&mut report, &push.proposal_id, e.into());
                    continue;
                }
            }

            if let Err(e) = self.backend.push(&push.git_args) {
                self.fail(&mut report, &push.proposal_id, e);
                continue;
            }

            report.executed += 1;
            info!(
                proposal_id = %push.proposal_id,
                target_ref = %push.target_ref,
                "certified push executed"
            );
            if let Err(e) = self.store.pending().mark_completed(&push.proposal_id) {
                warn!(proposal_id = %push.proposal_id, %e, "could not mark push completed");
            }
            self.record_push_event(&push);
        }

        report
    }

    fn fail(&self, report: &mut ProcessReport, proposal_id: &str, error: EngineError) {
        warn!(proposal_id, %error, "pending push failed");
        report.failed += 1;
        if let Err(e) = self
            .store
            .pending()
            .mark_failed(proposal_id, &error.to_string())
        {
            warn!(proposal_id, %e, "could not record push failure");
        }
        if report.first_error.is_none() {
            report.first_error = Some(error);
        }
    }

    /// Record the executed push in the log. Best effort: the push itself
    /// already happened.
    fn record_push_event(&self, push: &PendingPush) {
        let payload = PushEventPayload {
            args: &push.git_args,
            proposal_id: &push.proposal_id,
            remote: &push.remote,
            target_ref: &push.target_ref,
            new_oid: &push.new_oid,
            mode: "certified",
        };
        if let Err(e) = self.store.oplog().append_local(OP_GIT_PUSH, &payload) {
            warn!(proposal_id = %push.proposal_id, %e, "could not record push event");
        }
    }
}

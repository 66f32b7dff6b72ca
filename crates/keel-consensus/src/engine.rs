//! The proposal / vote / certification engine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use keel_store::Store;
use keel_types::{
    CertPayload, NodeId, OP_CONSENSUS_CERT, OP_CONSENSUS_PROPOSAL, OP_CONSENSUS_VOTE, OpId,
    Operation, ProposalPayload, VoteDecision, VotePayload, parse_rfc3339,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ConsensusError;

/// Input for a new ref-update proposal.
#[derive(Debug, Clone, Default)]
pub struct ProposeRefInput {
    /// Explicit proposal id; derived from the content when absent.
    pub proposal_id: Option<String>,
    /// Fully-qualified ref to update.
    pub ref_name: String,
    /// Object id the ref currently points at (may be empty).
    pub old_oid: String,
    /// Proposed new object id.
    pub new_oid: String,
    /// Membership epoch.
    pub epoch: u64,
    /// How long the proposal stays open for votes.
    pub ttl: Duration,
}

/// Snapshot of a proposal's derived state.
#[derive(Debug, Clone)]
pub struct ProposalStatus {
    pub proposal: ProposalPayload,
    pub threshold: f64,
    /// Effective membership: the configured set, or every author observed
    /// in the local log when none is configured.
    pub members: Vec<NodeId>,
    pub yes_voters: Vec<NodeId>,
    pub no_voters: Vec<NodeId>,
    /// Minimum yes count for quorum: `floor(threshold * |members|) + 1`.
    pub required_yes: usize,
    pub has_quorum: bool,
    /// Past expiry without a certification.
    pub expired: bool,
    pub certified: bool,
    pub certified_op_id: Option<OpId>,
}

/// Consensus engine: emits and folds the reserved `consensus.*` operations.
pub struct ConsensusEngine {
    store: Arc<Store>,
}

impl ConsensusEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Propose a ref update, emitting a signed `consensus.proposal` op.
    pub fn propose_ref_update(
        &self,
        input: ProposeRefInput,
    ) -> Result<(Operation, ProposalPayload), ConsensusError> {
        let ref_name = input.ref_name.trim().to_string();
        if ref_name.is_empty() {
            return Err(ConsensusError::RefRequired);
        }
        let new_oid = input.new_oid.trim().to_string();
        if new_oid.is_empty() {
            return Err(ConsensusError::NewOidRequired);
        }

        let now = Utc::now();
        let ttl = TimeDelta::from_std(input.ttl).map_err(|_| ConsensusError::InvalidTtl)?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(ConsensusError::InvalidTtl)?
            .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);

        let proposal_id = match input.proposal_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => derive_proposal_id(&ref_name, &new_oid, input.epoch),
        };

        let payload = ProposalPayload {
            proposal_id,
            ref_name,
            old_oid: input.old_oid.trim().to_string(),
            new_oid,
            epoch: input.epoch,
            expires_at,
        };
        let op = self
            .store
            .oplog()
            .append_local(OP_CONSENSUS_PROPOSAL, &payload)?;
        debug!(proposal_id = %payload.proposal_id, ref_name = %payload.ref_name, "proposed ref update");
        Ok((op, payload))
    }

    /// Cast this node's vote on an open proposal.
    pub fn cast_vote(
        &self,
        proposal_id: &str,
        decision: VoteDecision,
    ) -> Result<(Operation, VotePayload), ConsensusError> {
        let proposal = self
            .find_proposal(proposal_id)?
            .ok_or_else(|| ConsensusError::ProposalNotFound(proposal_id.to_string()))?;

        let expires = parse_rfc3339(&proposal.expires_at).map_err(ConsensusError::InvalidExpiry)?;
        if Utc::now() >= expires {
            return Err(ConsensusError::ProposalExpired(proposal_id.to_string()));
        }

        let payload = VotePayload {
            proposal_id: proposal.proposal_id,
            epoch: proposal.epoch,
            decision,
        };
        let op = self.store.oplog().append_local(OP_CONSENSUS_VOTE, &payload)?;
        debug!(proposal_id = %payload.proposal_id, decision = decision.as_str(), "cast vote");
        Ok((op, payload))
    }

    /// Certify a proposal, emitting a `consensus.cert` snapshot of the
    /// tally.
    ///
    /// Without `force` this requires quorum, a live proposal, and no prior
    /// certification. With `force` those gates are bypassed, but the cert
    /// payload still records the true `certified` value so the override
    /// stays auditable.
    pub fn certify(
        &self,
        proposal_id: &str,
        force: bool,
    ) -> Result<(Operation, CertPayload), ConsensusError> {
        let status = self.status(proposal_id)?;

        if !force {
            if status.certified {
                return Err(ConsensusError::AlreadyCertified(proposal_id.to_string()));
            }
            if status.expired {
                return Err(ConsensusError::ProposalExpired(proposal_id.to_string()));
            }
            if !status.has_quorum {
                return Err(ConsensusError::NoQuorum {
                    proposal_id: proposal_id.to_string(),
                    yes: status.yes_voters.len(),
                    required: status.required_yes,
                });
            }
        }

        let payload = CertPayload {
            proposal_id: status.proposal.proposal_id.clone(),
            epoch: status.proposal.epoch,
            threshold: status.threshold,
            members: status.members.clone(),
            yes_voters: status.yes_voters.clone(),
            no_voters: status.no_voters.clone(),
            required_yes: status.required_yes as u64,
            total_voters: status.members.len() as u64,
            certified: status.has_quorum,
        };
        let op = self.store.oplog().append_local(OP_CONSENSUS_CERT, &payload)?;
        debug!(
            proposal_id = %payload.proposal_id,
            certified = payload.certified,
            forced = force,
            "certified proposal"
        );
        Ok((op, payload))
    }

    /// Derive the full status of a proposal from the log and config.
    pub fn status(&self, proposal_id: &str) -> Result<ProposalStatus, ConsensusError> {
        let ops = self.store.oplog().ops(0);
        let config = self.store.consensus_config()?;

        let proposal = find_proposal_in(&ops, proposal_id)
            .ok_or_else(|| ConsensusError::ProposalNotFound(proposal_id.to_string()))?;

        let members: Vec<NodeId> = if config.members.is_empty() {
            // Auto-discover from authors seen locally. This view is
            // peer-dependent; explicit membership avoids the divergence.
            ops.iter().map(|op| op.author).collect::<BTreeSet<_>>().into_iter().collect()
        } else {
            config.members.clone()
        };

        // Latest vote per member, ordered by (seq, id); only votes cast in
        // the proposal's epoch count.
        let mut latest: BTreeMap<NodeId, (u64, OpId, VoteDecision)> = BTreeMap::new();
        for op in ops.iter().filter(|op| op.op_type == OP_CONSENSUS_VOTE) {
            let Ok(vote) = serde_json::from_str::<VotePayload>(op.payload.get()) else {
                continue;
            };
            if vote.proposal_id != proposal.proposal_id || vote.epoch != proposal.epoch {
                continue;
            }
            if !members.contains(&op.author) {
                continue;
            }
            let candidate = (op.seq, op.id, vote.decision);
            match latest.get(&op.author) {
                Some((seq, id, _)) if (op.seq, op.id) <= (*seq, *id) => {}
                _ => {
                    latest.insert(op.author, candidate);
                }
            }
        }

        let mut yes_voters = Vec::new();
        let mut no_voters = Vec::new();
        for (voter, (_, _, decision)) in &latest {
            match decision {
                VoteDecision::Yes => yes_voters.push(*voter),
                VoteDecision::No => no_voters.push(*voter),
            }
        }

        let certified_op_id = ops
            .iter()
            .filter(|op| op.op_type == OP_CONSENSUS_CERT)
            .find(|op| {
                serde_json::from_str::<CertPayload>(op.payload.get())
                    .map(|cert| cert.proposal_id == proposal.proposal_id)
                    .unwrap_or(false)
            })
            .map(|op| op.id);

        let expires = parse_rfc3339(&proposal.expires_at).map_err(ConsensusError::InvalidExpiry)?;
        let required = required_yes(config.threshold, members.len());

        Ok(ProposalStatus {
            threshold: config.threshold,
            has_quorum: yes_voters.len() >= required,
            required_yes: required,
            expired: Utc::now() >= expires && certified_op_id.is_none(),
            certified: certified_op_id.is_some(),
            certified_op_id,
            members,
            yes_voters,
            no_voters,
            proposal,
        })
    }

    /// Known proposal payloads, newest first, truncated to `limit` when
    /// `limit > 0`.
    pub fn proposal_summaries(&self, limit: usize) -> Vec<ProposalPayload> {
        let ops = self.store.oplog().ops(0);
        let mut proposals: Vec<(String, ProposalPayload)> = ops
            .iter()
            .filter(|op| op.op_type == OP_CONSENSUS_PROPOSAL)
            .filter_map(|op| {
                serde_json::from_str::<ProposalPayload>(op.payload.get())
                    .ok()
                    .map(|payload| (op.timestamp.clone(), payload))
            })
            .collect();
        proposals.sort_by(|a, b| {
            let ta = parse_rfc3339(&a.0).ok();
            let tb = parse_rfc3339(&b.0).ok();
            tb.cmp(&ta)
        });
        let mut out: Vec<ProposalPayload> = proposals.into_iter().map(|(_, p)| p).collect();
        if limit > 0 {
            out.truncate(limit);
        }
        out
    }

    fn find_proposal(&self, proposal_id: &str) -> Result<Option<ProposalPayload>, ConsensusError> {
        Ok(find_proposal_in(&self.store.oplog().ops(0), proposal_id))
    }
}

/// Minimum yes count for a strictly-greater-than-threshold yes ratio.
fn required_yes(threshold: f64, members: usize) -> usize {
    (threshold * members as f64).floor() as usize + 1
}

fn find_proposal_in(ops: &[Operation], proposal_id: &str) -> Option<ProposalPayload> {
    ops.iter()
        .filter(|op| op.op_type == OP_CONSENSUS_PROPOSAL)
        .filter_map(|op| serde_json::from_str::<ProposalPayload>(op.payload.get()).ok())
        .find(|payload| payload.proposal_id == proposal_id)
}

fn derive_proposal_id(ref_name: &str, new_oid: &str, epoch: u64) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(ref_name.as_bytes());
    hasher.update([0]);
    hasher.update(new_oid.as_bytes());
    hasher.update([0]);
    hasher.update(epoch.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(nanos.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

//! Append-only signed operation log.
//!
//! Every mutation a node makes (or accepts from a peer) is an [`Operation`]:
//! signed, content-addressed, and sequenced per author. The log is the
//! single source of truth the consensus layer derives its state from.
//!
//! Durability: one JSON document per line in `ops.log`, appended under the
//! write lock. On open the file is replayed; a malformed or unverifiable
//! line is fatal and reported with its line number. Duplicate lines (same
//! id) are absorbed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use keel_types::{NodeId, OpId, Operation, Payload, empty_payload, signable_bytes};
use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::StoreError;
use crate::identity::NodeIdentity;

/// Thread-safe signed operation log.
///
/// Mutators take the write lock; readers take the read lock and return
/// defensive copies (payloads are raw-JSON boxes, cloned on ingest and on
/// read).
#[derive(Debug)]
pub struct OpLog {
    path: PathBuf,
    identity: Arc<NodeIdentity>,
    inner: RwLock<LogInner>,
}

#[derive(Default, Debug)]
struct LogInner {
    /// Operations in local arrival order.
    ops: Vec<Operation>,
    /// Known operation ids, for duplicate absorption.
    ids: HashSet<OpId>,
    /// Highest sequence number seen per author.
    seq_by_author: BTreeMap<NodeId, u64>,
    /// `(author, seq)` → id, for conflict detection.
    by_author_seq: HashMap<(NodeId, u64), OpId>,
}

impl OpLog {
    /// Open the log at `path`, replaying any existing file.
    pub fn open(path: impl Into<PathBuf>, identity: Arc<NodeIdentity>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = LogInner::default();

        match File::open(&path) {
            Ok(file) => {
                for (idx, line) in BufReader::new(file).lines().enumerate() {
                    let line = line?;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let replay_err = |source: StoreError| StoreError::OpsLogReplay {
                        line: idx + 1,
                        source: Box::new(source),
                    };
                    let op: Operation =
                        serde_json::from_str(trimmed).map_err(|e| replay_err(e.into()))?;
                    Self::add_locked(&mut inner, &path, op, false).map_err(replay_err)?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            identity,
            inner: RwLock::new(inner),
        })
    }

    /// Append a new operation authored and signed by this node.
    ///
    /// `payload` is serialized to canonical JSON; use
    /// [`append_local_json`](Self::append_local_json) when the payload is
    /// already JSON text.
    pub fn append_local<T: Serialize>(
        &self,
        op_type: &str,
        payload: &T,
    ) -> Result<Operation, StoreError> {
        let raw = serde_json::value::to_raw_value(payload)?;
        self.append_local_payload(op_type, raw)
    }

    /// Append a new operation whose payload is given as JSON text.
    ///
    /// Empty input is normalized to `{}`; anything that is not valid JSON
    /// is rejected.
    pub fn append_local_json(&self, op_type: &str, payload: &str) -> Result<Operation, StoreError> {
        let trimmed = payload.trim();
        let raw = if trimmed.is_empty() {
            empty_payload()
        } else {
            RawValue::from_string(trimmed.to_string()).map_err(StoreError::InvalidPayload)?
        };
        self.append_local_payload(op_type, raw)
    }

    fn append_local_payload(&self, op_type: &str, payload: Payload) -> Result<Operation, StoreError> {
        let op_type = op_type.trim();
        if op_type.is_empty() {
            return Err(StoreError::TypeRequired);
        }

        // Sequence allocation and insertion happen under one write lock so
        // concurrent appends cannot race the same slot.
        let mut inner = self.inner.write().expect("op log lock poisoned");

        let author = self.identity.node_id();
        let seq = inner.seq_by_author.get(&author).copied().unwrap_or(0) + 1;
        let timestamp = keel_types::now_rfc3339();
        let public_key = self.identity.public_key_base64().to_string();

        let signable = signable_bytes(op_type, author, seq, &timestamp, &payload, &public_key);
        let signature = self.identity.sign(&signable);
        let id = OpId::compute(&signable, &signature.to_bytes());

        let op = Operation {
            id,
            op_type: op_type.to_string(),
            author,
            seq,
            timestamp,
            payload,
            public_key,
            signature: BASE64.encode(signature.to_bytes()),
        };

        let added = Self::add_locked(&mut inner, &self.path, op.clone(), true)?;
        debug_assert!(added, "freshly sequenced operation cannot be a duplicate");
        Ok(op)
    }

    /// Validate and ingest an operation received from a peer.
    ///
    /// Returns `Ok(false)` for an exact duplicate (same id). A different
    /// operation for an already-occupied `(author, seq)` slot is a
    /// [`StoreError::SeqConflict`]; any invariant violation surfaces as a
    /// verification error.
    pub fn add_remote(&self, op: Operation) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().expect("op log lock poisoned");
        Self::add_locked(&mut inner, &self.path, op, true)
    }

    fn add_locked(
        inner: &mut LogInner,
        path: &Path,
        op: Operation,
        persist: bool,
    ) -> Result<bool, StoreError> {
        verify_operation(&op)?;

        if inner.ids.contains(&op.id) {
            return Ok(false);
        }
        if let Some(existing) = inner.by_author_seq.get(&(op.author, op.seq))
            && *existing != op.id
        {
            return Err(StoreError::SeqConflict {
                author: op.author,
                seq: op.seq,
            });
        }

        if persist {
            append_line(path, &op)?;
        }

        inner.ids.insert(op.id);
        inner.by_author_seq.insert((op.author, op.seq), op.id);
        let max = inner.seq_by_author.entry(op.author).or_insert(0);
        if op.seq > *max {
            *max = op.seq;
        }
        inner.ops.push(op);
        Ok(true)
    }

    /// Map of author → highest known sequence number.
    pub fn summary(&self) -> BTreeMap<NodeId, u64> {
        self.inner
            .read()
            .expect("op log lock poisoned")
            .seq_by_author
            .clone()
    }

    /// Operations newer than the given summary, ordered by author then
    /// sequence. `limit == 0` means unlimited.
    pub fn missing_for(&self, summary: &BTreeMap<NodeId, u64>, limit: usize) -> Vec<Operation> {
        let inner = self.inner.read().expect("op log lock poisoned");
        let mut out: Vec<Operation> = inner
            .ops
            .iter()
            .filter(|op| op.seq > summary.get(&op.author).copied().unwrap_or(0))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.author, a.seq).cmp(&(b.author, b.seq)));
        if limit > 0 {
            out.truncate(limit);
        }
        out
    }

    /// All known operations ordered by author then sequence. When `limit`
    /// truncates, the tail (most recent in that ordering) is returned.
    pub fn ops(&self, limit: usize) -> Vec<Operation> {
        let inner = self.inner.read().expect("op log lock poisoned");
        let mut out = inner.ops.clone();
        out.sort_by(|a, b| (a.author, a.seq).cmp(&(b.author, b.seq)));
        if limit > 0 && out.len() > limit {
            out.drain(..out.len() - limit);
        }
        out
    }

    /// Number of operations in the log.
    pub fn len(&self) -> usize {
        self.inner.read().expect("op log lock poisoned").ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn append_line(path: &Path, op: &Operation) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut encoded = serde_json::to_vec(op)?;
    encoded.push(b'\n');
    file.write_all(&encoded)?;
    Ok(())
}

/// Check every invariant of an operation: field presence, timestamp format,
/// key/author binding, signature, and id.
pub fn verify_operation(op: &Operation) -> Result<(), StoreError> {
    if op.op_type.trim().is_empty() {
        return Err(StoreError::TypeRequired);
    }
    if op.seq == 0 {
        return Err(StoreError::ZeroSeq);
    }
    keel_types::parse_rfc3339(&op.timestamp).map_err(StoreError::InvalidTimestamp)?;

    let public = BASE64
        .decode(&op.public_key)
        .map_err(StoreError::PublicKeyEncoding)?;
    let public: [u8; 32] = public
        .try_into()
        .map_err(|bytes: Vec<u8>| StoreError::PublicKeyLength(bytes.len()))?;
    if NodeId::from_public_key(&public) != op.author {
        return Err(StoreError::AuthorMismatch);
    }

    let signature = BASE64
        .decode(&op.signature)
        .map_err(StoreError::SignatureEncoding)?;
    let signature: [u8; 64] = signature
        .try_into()
        .map_err(|bytes: Vec<u8>| StoreError::SignatureLength(bytes.len()))?;

    let verifying_key =
        VerifyingKey::from_bytes(&public).map_err(|_| StoreError::MalformedPublicKey)?;
    let signable = op.signable_bytes();
    verifying_key
        .verify(&signable, &Signature::from_bytes(&signature))
        .map_err(|_| StoreError::BadSignature)?;

    if OpId::compute(&signable, &signature) != op.id {
        return Err(StoreError::IdMismatch);
    }
    Ok(())
}

//! Shared types and identifiers for keel.
//!
//! This crate defines the types used across the keel workspace:
//! identifiers ([`NodeId`], [`OpId`]), the replicated [`Operation`] record
//! and its canonical signable encoding, the consensus payload documents,
//! and the durable [`PendingPush`] record.

pub mod consensus;
pub mod pending;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

pub use consensus::{CertPayload, ConsensusConfig, ProposalPayload, VoteDecision, VotePayload};
pub use pending::{PendingPush, PushStatus};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Failed to parse a hex identifier.
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} id: expected {expected} hex characters")]
pub struct IdParseError {
    kind: &'static str,
    expected: usize,
}

macro_rules! define_hex_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Return the raw byte representation.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let err = || IdParseError {
                    kind: stringify!($name),
                    expected: $len * 2,
                };
                if s.len() != $len * 2 {
                    return Err(err());
                }
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes).map_err(|_| err())?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

define_hex_id!(
    /// Identifier for a node: lowercase hex of the first 16 bytes of
    /// `SHA-256(public_key)`. Doubles as the author of every operation the
    /// node signs.
    NodeId,
    16
);

define_hex_id!(
    /// Content hash of an operation:
    /// `hex(SHA-256(signable_bytes || raw_signature))`.
    OpId,
    32
);

impl NodeId {
    /// Derive a node id from raw Ed25519 public key bytes.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }
}

impl OpId {
    /// Compute an operation id from its signable bytes and raw signature.
    pub fn compute(signable: &[u8], signature: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(signable);
        hasher.update(signature);
        Self(hasher.finalize().into())
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Reserved operation type: a proposal to update a ref.
pub const OP_CONSENSUS_PROPOSAL: &str = "consensus.proposal";
/// Reserved operation type: a vote on a proposal.
pub const OP_CONSENSUS_VOTE: &str = "consensus.vote";
/// Reserved operation type: a certification snapshot for a proposal.
pub const OP_CONSENSUS_CERT: &str = "consensus.cert";
/// Reserved operation type: a recorded commit event.
pub const OP_GIT_COMMIT: &str = "git.commit";
/// Reserved operation type: a recorded push event.
pub const OP_GIT_PUSH: &str = "git.push";
/// Reserved operation type: a recorded pull event.
pub const OP_GIT_PULL: &str = "git.pull";

/// An operation payload: an opaque, already-valid JSON document.
///
/// Kept as raw JSON text so the canonical signable encoding is bit-stable
/// regardless of how the payload was produced.
pub type Payload = Box<RawValue>;

/// The canonical empty payload, `{}`.
pub fn empty_payload() -> Payload {
    RawValue::from_string("{}".to_string()).expect("literal {} is valid JSON")
}

/// A signed, immutable record replicated between peers.
///
/// Operations form per-author chains ordered by `seq`; across authors there
/// is no global order. Once accepted into a log an operation is never
/// mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Content hash binding the signable fields and the signature.
    pub id: OpId,
    /// Free-form type tag (see the `OP_*` constants for reserved types).
    #[serde(rename = "type")]
    pub op_type: String,
    /// Node id of the signer, derived from `public_key`.
    pub author: NodeId,
    /// Per-author monotonic sequence number, dense and starting at 1.
    pub seq: u64,
    /// RFC 3339 timestamp with nanosecond precision, UTC.
    pub timestamp: String,
    /// Opaque JSON payload. Missing payloads decode as `{}`.
    #[serde(default = "empty_payload")]
    pub payload: Payload,
    /// Base64 (standard) Ed25519 public key of the signer.
    pub public_key: String,
    /// Base64 (standard) Ed25519 signature over the signable bytes.
    pub signature: String,
}

/// The signable subset of an operation, in the fixed canonical field order.
#[derive(Serialize)]
struct Signable<'a> {
    #[serde(rename = "type")]
    op_type: &'a str,
    author: NodeId,
    seq: u64,
    timestamp: &'a str,
    payload: &'a RawValue,
    public_key: &'a str,
}

/// Encode the canonical signable JSON document for an operation.
///
/// Field order is fixed: `type, author, seq, timestamp, payload,
/// public_key`. The payload is embedded verbatim; callers must pass `{}`
/// for empty payloads.
pub fn signable_bytes(
    op_type: &str,
    author: NodeId,
    seq: u64,
    timestamp: &str,
    payload: &RawValue,
    public_key: &str,
) -> Vec<u8> {
    let doc = Signable {
        op_type,
        author,
        seq,
        timestamp,
        payload,
        public_key,
    };
    serde_json::to_vec(&doc).expect("signable document serialization cannot fail")
}

impl Operation {
    /// Canonical signable bytes of this operation.
    pub fn signable_bytes(&self) -> Vec<u8> {
        signable_bytes(
            &self.op_type,
            self.author,
            self.seq,
            self.timestamp.as_str(),
            &self.payload,
            &self.public_key,
        )
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current UTC time as an RFC 3339 string with nanosecond precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 timestamp into a UTC datetime.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_round_trip() {
        let id = NodeId::from_public_key(b"some public key bytes");
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        let parsed: NodeId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_node_id_rejects_bad_hex() {
        assert!("zz".repeat(16).parse::<NodeId>().is_err());
        assert!("abcd".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_op_id_deterministic() {
        let a = OpId::compute(b"signable", b"signature");
        let b = OpId::compute(b"signable", b"signature");
        assert_eq!(a, b);
        assert_ne!(a, OpId::compute(b"signable", b"other"));
    }

    #[test]
    fn test_id_serde_as_hex_string() {
        let id = NodeId::from_public_key(b"key");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_signable_field_order_is_fixed() {
        let author = NodeId::from_public_key(b"pk");
        let payload = RawValue::from_string(r#"{"hash":"abc"}"#.to_string()).unwrap();
        let bytes = signable_bytes(
            "git.commit",
            author,
            3,
            "2026-01-02T03:04:05.000000006Z",
            &payload,
            "cHVibGljLWtleQ==",
        );
        let expected = format!(
            r#"{{"type":"git.commit","author":"{author}","seq":3,"timestamp":"2026-01-02T03:04:05.000000006Z","payload":{{"hash":"abc"}},"public_key":"cHVibGljLWtleQ=="}}"#
        );
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn test_operation_missing_payload_decodes_as_empty() {
        let author = NodeId::from_public_key(b"pk");
        let id = OpId::compute(b"a", b"b");
        let json = format!(
            r#"{{"id":"{id}","type":"t","author":"{author}","seq":1,"timestamp":"2026-01-01T00:00:00.000000000Z","public_key":"pk","signature":"sig"}}"#
        );
        let op: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op.payload.get(), "{}");
    }

    #[test]
    fn test_now_rfc3339_parses_back() {
        let now = now_rfc3339();
        assert!(parse_rfc3339(&now).is_ok());
    }
}

//! Error types for the store crate.

use keel_types::NodeId;

/// Errors produced by the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure in a persisted document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation was submitted without a type tag.
    #[error("operation type is required")]
    TypeRequired,

    /// An operation payload was not syntactically valid JSON.
    #[error("operation payload must be valid JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// A peer URL failed normalization.
    #[error("invalid peer URL: {0}")]
    InvalidPeerUrl(String),

    /// The consensus threshold is outside `[0, 1)`.
    #[error("consensus threshold must be in [0, 1), got {0}")]
    InvalidThreshold(f64),

    /// A pending push is missing its proposal id.
    #[error("pending push proposal id is required")]
    ProposalIdRequired,

    /// A pending push is missing its target ref.
    #[error("pending push target ref is required")]
    TargetRefRequired,

    /// Operation sequence numbers start at 1.
    #[error("operation sequence must be greater than zero")]
    ZeroSeq,

    /// The operation timestamp is not valid RFC 3339.
    #[error("invalid operation timestamp: {0}")]
    InvalidTimestamp(#[source] chrono::ParseError),

    /// The operation public key is not valid base64.
    #[error("invalid public key encoding: {0}")]
    PublicKeyEncoding(#[source] base64::DecodeError),

    /// The operation public key has the wrong length.
    #[error("invalid public key length: expected 32 bytes, got {0}")]
    PublicKeyLength(usize),

    /// The public key bytes do not form a valid Ed25519 point.
    #[error("malformed public key")]
    MalformedPublicKey,

    /// The operation author does not equal the id derived from its key.
    #[error("operation author does not match public key")]
    AuthorMismatch,

    /// The operation signature is not valid base64.
    #[error("invalid signature encoding: {0}")]
    SignatureEncoding(#[source] base64::DecodeError),

    /// The operation signature has the wrong length.
    #[error("invalid signature length: expected 64 bytes, got {0}")]
    SignatureLength(usize),

    /// The signature does not verify against the signable bytes.
    #[error("signature verification failed")]
    BadSignature,

    /// The operation id does not match its content and signature.
    #[error("operation id does not match signed content")]
    IdMismatch,

    /// A different operation already occupies this `(author, seq)` slot.
    /// Indicates a compromised key or a buggy peer.
    #[error("conflicting operations for {author} seq={seq}")]
    SeqConflict { author: NodeId, seq: u64 },

    /// No pending push is tracked for the given proposal.
    #[error("no pending push for proposal {0}")]
    PendingPushNotFound(String),

    /// The identity file failed validation on load.
    #[error("identity file is corrupt: {0}")]
    IdentityCorrupt(&'static str),

    /// A line of the ops log failed to replay.
    #[error("ops log line {line}: {source}")]
    OpsLogReplay {
        line: usize,
        #[source]
        source: Box<StoreError>,
    },

    /// No identity directory could be determined for this platform.
    #[error("could not determine an identity directory (set {0})")]
    NoIdentityDir(&'static str),
}

//! Node identity: a persistent Ed25519 keypair and the derived node id.
//!
//! The identity is created on first open and immutable thereafter. The
//! private key never leaves the identity file (mode 0600); operations carry
//! only the public key.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use keel_types::NodeId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::atomic::write_json_atomic;
use crate::error::StoreError;

/// The signing half of a node, loaded once per store open.
///
/// Key material is read-only after construction, so the identity is shared
/// freely across threads without locking.
#[derive(Debug)]
pub struct NodeIdentity {
    signing_key: SigningKey,
    node_id: NodeId,
    public_key_b64: String,
}

/// The shareable view of an identity: node id and public key only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub node_id: NodeId,
    /// Base64 (standard) Ed25519 public key.
    pub public_key: String,
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    node_id: NodeId,
    public_key: String,
    private_key: String,
}

impl NodeIdentity {
    /// Load the identity at `path`, generating and persisting a fresh
    /// keypair if the file does not exist.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Self::generate(path)
        }
    }

    fn generate(path: &Path) -> Result<Self, StoreError> {
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);

        let verifying_key = signing_key.verifying_key();
        let node_id = NodeId::from_public_key(verifying_key.as_bytes());
        let file = IdentityFile {
            node_id,
            public_key: BASE64.encode(verifying_key.as_bytes()),
            private_key: BASE64.encode(signing_key.as_bytes()),
        };
        write_json_atomic(path, &file, Some(0o600))?;
        info!(%node_id, "generated node identity");

        Ok(Self {
            signing_key,
            node_id,
            public_key_b64: file.public_key,
        })
    }

    fn load(path: &Path) -> Result<Self, StoreError> {
        let data = fs::read(path)?;
        let file: IdentityFile = serde_json::from_slice(&data)?;

        let public = BASE64
            .decode(&file.public_key)
            .map_err(|_| StoreError::IdentityCorrupt("public key is not valid base64"))?;
        let private = BASE64
            .decode(&file.private_key)
            .map_err(|_| StoreError::IdentityCorrupt("private key is not valid base64"))?;

        let public: [u8; 32] = public
            .try_into()
            .map_err(|_| StoreError::IdentityCorrupt("public key length is invalid"))?;
        let private: [u8; 32] = private
            .try_into()
            .map_err(|_| StoreError::IdentityCorrupt("private key length is invalid"))?;

        let signing_key = SigningKey::from_bytes(&private);
        if signing_key.verifying_key().as_bytes() != &public {
            return Err(StoreError::IdentityCorrupt(
                "private key does not match public key",
            ));
        }
        if NodeId::from_public_key(&public) != file.node_id {
            return Err(StoreError::IdentityCorrupt(
                "node id does not match public key",
            ));
        }

        Ok(Self {
            signing_key,
            node_id: file.node_id,
            public_key_b64: file.public_key,
        })
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The verification key (dalek type).
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Base64 encoding of the public key, as carried in operations.
    pub fn public_key_base64(&self) -> &str {
        &self.public_key_b64
    }

    /// The identity without private key material.
    pub fn public_view(&self) -> PublicIdentity {
        PublicIdentity {
            node_id: self.node_id,
            public_key: self.public_key_b64.clone(),
        }
    }

    /// Sign a message with this node's key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    #[test]
    fn test_generate_then_load_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = NodeIdentity::load_or_generate(&path).unwrap();
        let second = NodeIdentity::load_or_generate(&path).unwrap();

        assert_eq!(first.node_id(), second.node_id());
        assert_eq!(first.public_key_base64(), second.public_key_base64());
    }

    #[test]
    fn test_sign_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let identity = NodeIdentity::load_or_generate(dir.path().join("id.json")).unwrap();

        let sig = identity.sign(b"message");
        assert!(identity.verifying_key().verify(b"message", &sig).is_ok());
        assert!(identity.verifying_key().verify(b"other", &sig).is_err());
    }

    #[test]
    fn test_node_id_matches_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let identity = NodeIdentity::load_or_generate(dir.path().join("id.json")).unwrap();
        let expected = NodeId::from_public_key(identity.verifying_key().as_bytes());
        assert_eq!(identity.node_id(), expected);
    }

    #[test]
    fn test_load_rejects_mismatched_node_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        NodeIdentity::load_or_generate(&path).unwrap();

        // Corrupt the stored node id.
        let mut file: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        file["node_id"] = serde_json::Value::String("00".repeat(16));
        std::fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        let err = NodeIdentity::load_or_generate(&path).unwrap_err();
        assert!(matches!(err, StoreError::IdentityCorrupt(_)));
    }

    #[test]
    fn test_load_rejects_swapped_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.json");
        let path_b = dir.path().join("b.json");
        NodeIdentity::load_or_generate(&path_a).unwrap();
        NodeIdentity::load_or_generate(&path_b).unwrap();

        // Splice b's private key into a's file.
        let mut a: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path_a).unwrap()).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path_b).unwrap()).unwrap();
        a["private_key"] = b["private_key"].clone();
        std::fs::write(&path_a, serde_json::to_string(&a).unwrap()).unwrap();

        let err = NodeIdentity::load_or_generate(&path_a).unwrap_err();
        assert!(matches!(err, StoreError::IdentityCorrupt(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        NodeIdentity::load_or_generate(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

//! On-disk layout for a repository's gossip metadata.
//!
//! Repo-local state lives under `<repo>/.vcs/gossip/`; the identity keypair
//! lives outside the repository in the platform config directory, keyed by
//! a hash of the absolute repo path, so that working-tree operations never
//! touch key material.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::StoreError;

const METADATA_DIR: &str = ".vcs";
const GOSSIP_DIR: &str = "gossip";
const APP_NAME: &str = "keel";

/// Environment override for the identity root directory.
pub const IDENTITY_DIR_ENV: &str = "KEEL_IDENTITY_DIR";

/// Resolved paths for one repository's store.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    repo_root: PathBuf,
    gossip_dir: PathBuf,
    identity_dir: PathBuf,
}

impl RepoLayout {
    /// Resolve the layout for a repository, using the default identity root
    /// (`$KEEL_IDENTITY_DIR`, or `<config dir>/keel/identities`).
    pub fn new(repo_root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_identity_root(repo_root, default_identity_root()?)
    }

    /// Resolve the layout with an explicit identity root directory.
    pub fn with_identity_root(
        repo_root: impl Into<PathBuf>,
        identity_root: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let repo_root = std::path::absolute(repo_root.into())?;
        let gossip_dir = repo_root.join(METADATA_DIR).join(GOSSIP_DIR);
        let identity_dir = identity_root.into().join(repo_hash(&repo_root));
        Ok(Self {
            repo_root,
            gossip_dir,
            identity_dir,
        })
    }

    /// Absolute repository root.
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Directory holding the repo-local gossip state.
    pub fn gossip_dir(&self) -> &Path {
        &self.gossip_dir
    }

    /// Directory holding this repository's identity file.
    pub fn identity_dir(&self) -> &Path {
        &self.identity_dir
    }

    pub fn identity_file(&self) -> PathBuf {
        self.identity_dir.join("identity.json")
    }

    pub fn ops_log(&self) -> PathBuf {
        self.gossip_dir.join("ops.log")
    }

    pub fn peers_file(&self) -> PathBuf {
        self.gossip_dir.join("peers.json")
    }

    pub fn consensus_file(&self) -> PathBuf {
        self.gossip_dir.join("consensus.json")
    }

    pub fn pending_pushes_file(&self) -> PathBuf {
        self.gossip_dir.join("pending_pushes.json")
    }

    /// Create the gossip and identity directories if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.gossip_dir)?;
        std::fs::create_dir_all(&self.identity_dir)?;
        Ok(())
    }
}

fn default_identity_root() -> Result<PathBuf, StoreError> {
    if let Ok(dir) = std::env::var(IDENTITY_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|d| d.join(APP_NAME).join("identities"))
        .ok_or(StoreError::NoIdentityDir(IDENTITY_DIR_ENV))
}

/// Hex SHA-256 of the absolute repository path.
fn repo_hash(repo_root: &Path) -> String {
    hex::encode(Sha256::digest(repo_root.as_os_str().as_encoded_bytes()))
}

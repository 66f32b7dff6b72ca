//! The per-repository store facade.

use std::path::Path;
use std::sync::Arc;

use keel_types::{ConsensusConfig, NodeId};

use crate::config::ConsensusStore;
use crate::error::StoreError;
use crate::identity::{NodeIdentity, PublicIdentity};
use crate::layout::RepoLayout;
use crate::oplog::OpLog;
use crate::peers::PeerRegistry;
use crate::pending::PendingPushQueue;

/// One repository's gossip metadata: identity, op log, peers, consensus
/// configuration, and the pending-push queue.
///
/// Each component guards its own state; no two component locks are ever
/// held in the same call frame. Opening the same store from multiple
/// processes concurrently is not supported: there is no cross-process
/// file lock.
pub struct Store {
    layout: RepoLayout,
    identity: Arc<NodeIdentity>,
    oplog: OpLog,
    peers: PeerRegistry,
    consensus: ConsensusStore,
    pending: PendingPushQueue,
}

impl Store {
    /// Open (or initialize) the store for a repository, with the identity
    /// kept in the default identity root (`$KEEL_IDENTITY_DIR` or the
    /// platform config dir).
    pub fn open(repo_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_layout(RepoLayout::new(repo_root.as_ref())?)
    }

    /// Open the store with an explicit identity root, bypassing the
    /// environment default.
    pub fn open_with_identity_root(
        repo_root: impl AsRef<Path>,
        identity_root: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        Self::from_layout(RepoLayout::with_identity_root(
            repo_root.as_ref(),
            identity_root.as_ref(),
        )?)
    }

    fn from_layout(layout: RepoLayout) -> Result<Self, StoreError> {
        layout.ensure_dirs()?;
        let identity = Arc::new(NodeIdentity::load_or_generate(layout.identity_file())?);
        let oplog = OpLog::open(layout.ops_log(), identity.clone())?;
        let peers = PeerRegistry::open(layout.peers_file())?;
        let consensus = ConsensusStore::new(layout.consensus_file());
        let pending = PendingPushQueue::new(layout.pending_pushes_file());

        Ok(Self {
            layout,
            identity,
            oplog,
            peers,
            consensus,
            pending,
        })
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    /// The identity without private key material.
    pub fn public_identity(&self) -> PublicIdentity {
        self.identity.public_view()
    }

    /// The signing identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// The signed operation log.
    pub fn oplog(&self) -> &OpLog {
        &self.oplog
    }

    /// The peer registry.
    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Load the consensus configuration (default when unset).
    pub fn consensus_config(&self) -> Result<ConsensusConfig, StoreError> {
        self.consensus.load()
    }

    /// Normalize, persist, and return the consensus configuration.
    pub fn save_consensus_config(
        &self,
        config: ConsensusConfig,
    ) -> Result<ConsensusConfig, StoreError> {
        self.consensus.save(config)
    }

    /// The pending-push queue.
    pub fn pending(&self) -> &PendingPushQueue {
        &self.pending
    }

    /// Resolved on-disk layout.
    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_store(dir: &Path) -> Store {
        Store::open_with_identity_root(dir.join("repo"), dir.join("identities")).unwrap()
    }

    #[test]
    fn test_identity_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = open_store(dir.path());
        let node_id = first.node_id();
        let public_key = first.public_identity().public_key;
        drop(first);

        let second = open_store(dir.path());
        assert_eq!(second.node_id(), node_id);
        assert_eq!(second.public_identity().public_key, public_key);
    }

    #[test]
    fn test_components_share_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store.oplog().append_local("note", &json!({})).unwrap();
        store.peers().add("127.0.0.1:8787").unwrap();
        store
            .save_consensus_config(ConsensusConfig {
                threshold: 0.6,
                members: vec![store.node_id()],
            })
            .unwrap();

        let gossip = store.layout().gossip_dir();
        assert!(gossip.join("ops.log").exists());
        assert!(gossip.join("peers.json").exists());
        assert!(gossip.join("consensus.json").exists());
    }

    #[test]
    fn test_distinct_repos_get_distinct_identities() {
        let dir = tempfile::tempdir().unwrap();
        let a = Store::open_with_identity_root(dir.path().join("a"), dir.path().join("ids"))
            .unwrap();
        let b = Store::open_with_identity_root(dir.path().join("b"), dir.path().join("ids"))
            .unwrap();
        assert_ne!(a.node_id(), b.node_id());
    }
}

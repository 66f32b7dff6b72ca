//! Durable per-repository store for the keel metadata core.
//!
//! Everything a node persists lives here:
//! - `identity.json` — Ed25519 keypair + derived node id (outside the repo,
//!   in the platform config dir)
//! - `ops.log` — append-only, line-delimited JSON operation log
//! - `peers.json` — normalized gossip peer base URLs
//! - `consensus.json` — quorum threshold + membership
//! - `pending_pushes.json` — push intents awaiting certification
//!
//! JSON documents are written temp-file-then-rename; the op log is
//! append-only and replayed on open.

mod atomic;
mod config;
mod error;
mod identity;
mod layout;
mod oplog;
mod peers;
mod pending;
mod store;

pub use config::ConsensusStore;
pub use error::StoreError;
pub use identity::{NodeIdentity, PublicIdentity};
pub use layout::{IDENTITY_DIR_ENV, RepoLayout};
pub use oplog::{OpLog, verify_operation};
pub use peers::{PeerRegistry, normalize_peer};
pub use pending::PendingPushQueue;
pub use store::Store;

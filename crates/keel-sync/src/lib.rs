//! HTTP anti-entropy sync for the keel op log.
//!
//! Three JSON endpoints replicate operations between peers:
//!
//! - `GET /gossip/summary` — author → max sequence known to the peer
//! - `POST /gossip/missing` — operations the caller lacks, per its summary
//! - `POST /gossip/ops` — push operations to the peer
//!
//! plus `GET /health`. [`sync_peer`] drives bounded push/pull rounds
//! against one peer until a round moves nothing; [`sync_all`] runs it
//! against every registered peer. The server side is stateless beyond the
//! op log and safe to call concurrently.
//!
//! No authentication is performed; running this across a trust boundary
//! requires an external TLS/mTLS layer.

mod client;
mod error;
mod server;
mod sync;
mod wire;

pub use client::SyncClient;
pub use error::SyncError;
pub use server::router;
pub use sync::{SyncAllReport, SyncStats, sync_all, sync_peer};
pub use wire::{HealthResponse, MissingRequest, MissingResponse, PushOpsRequest, PushOpsResponse, SummaryResponse};

//! Consensus-gated push orchestration.
//!
//! The engine never touches a repository itself: all VCS interaction goes
//! through the [`VcsBackend`] trait, invoked with opaque argument vectors.
//! A push becomes a proposal, an automatic yes vote, and a durable queue
//! entry; [`PushOrchestrator::process_pending`] drives each entry from
//! quorum to certification to the external push.

mod backend;
mod error;
mod intent;
mod orchestrator;

pub use backend::VcsBackend;
pub use error::EngineError;
pub use intent::{PushIntent, resolve_push_intent};
pub use orchestrator::{ProcessReport, PushOrchestrator, PushOutcome};

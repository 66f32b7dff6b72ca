//! Consensus over ref updates, derived from the signed op log.
//!
//! Nothing here keeps private state: proposals, votes, and certifications
//! are ordinary operations in the log, and every query folds the log (plus
//! the persisted configuration) into a [`ProposalStatus`]. Two peers that
//! have ingested the same set of operations therefore agree on every
//! tally.

mod engine;
mod error;

pub use engine::{ConsensusEngine, ProposalStatus, ProposeRefInput};
pub use error::ConsensusError;

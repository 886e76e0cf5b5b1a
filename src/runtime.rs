//! Turn runner
//!
//! One inbound message drives the node graph from `router` to `end` against
//! the session's checkpoint. Turns on the same session are serialized; turns
//! on different sessions run independently.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{TurnRunner, MAX_HOPS};
pub use traits::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};

use crate::state_machine::TransitionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Checkpoint store failed: {0}")]
    Checkpoint(String),
    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),
    #[error("Turn exceeded {0} steps")]
    HopLimit(usize),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Turn ended without a reply")]
    NoReply,
}

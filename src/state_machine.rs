//! Session state and the per-turn node graph
//!
//! Steps never mutate the session directly: they read a snapshot and return a
//! [`StateDelta`], and the node order is decided by the pure [`transition`].

pub mod delta;
pub mod record;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use delta::StateDelta;
pub use record::{
    ClientRecord, DocumentType, EntityKind, FieldError, FieldSpec, IntakeRecord, VehicleRecord,
};
pub use state::{
    ChatMessage, ChatRole, ConfirmationRequest, ConfirmedField, NextStep, SessionState,
};
pub use transition::{transition, Node, TransitionError};

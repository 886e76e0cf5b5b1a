//! Partial state updates returned by steps

use super::record::{ClientRecord, VehicleRecord};
use super::state::{ConfirmationRequest, NextStep};

/// What one step changes in the session.
///
/// Fields left as `None` are untouched when the delta is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub client: Option<ClientRecord>,
    pub vehicle: Option<VehicleRecord>,
    /// `Some(None)` clears the pending request
    pub confirmation: Option<Option<ConfirmationRequest>>,
    /// Appended to the turn's outgoing notes
    pub notes: Vec<String>,
    pub intent_description: Option<String>,
    pub raw_fragments: Option<Vec<String>>,
    pub next_step: Option<NextStep>,
    pub first_turn: Option<bool>,
    pub eligibility_notified: Option<bool>,
    /// Final text for the user; only set by response generation
    pub reply: Option<String>,
}

impl StateDelta {
    pub fn with_client(mut self, client: ClientRecord) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_vehicle(mut self, vehicle: VehicleRecord) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    pub fn with_confirmation(mut self, request: ConfirmationRequest) -> Self {
        self.confirmation = Some(Some(request));
        self
    }

    pub fn clear_confirmation(mut self) -> Self {
        self.confirmation = Some(None);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_next(mut self, step: NextStep) -> Self {
        self.next_step = Some(step);
        self
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

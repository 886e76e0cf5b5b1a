//! Session state types

use super::delta::StateDelta;
use super::record::{ClientRecord, EntityKind, VehicleRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Confirmation
// ============================================================================

/// One field shown to the user for confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedField {
    pub field: String,
    pub label: String,
    pub value: String,
}

/// Pending request asking the user to confirm one record's fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub entity: EntityKind,
    pub fields: Vec<ConfirmedField>,
}

impl ConfirmationRequest {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field.as_str())
    }

    /// "label: value" lines, one per field
    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("- {}: {}", f.label, f.value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The prompt shown to the user when the request is created
    pub fn prompt(&self) -> String {
        format!(
            "Please confirm the following {} details:\n{}\nReply yes to confirm or tell me what to change.",
            self.entity,
            self.summary()
        )
    }
}

// ============================================================================
// Routing
// ============================================================================

/// The step chosen for this turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    CollectClientData,
    ConfirmClientData,
    CollectVehicleData,
    ConfirmVehicleData,
    CheckEligibility,
    GenerateResponse,
    #[default]
    Fallback,
}

impl NextStep {
    pub const ALL: [NextStep; 7] = [
        NextStep::CollectClientData,
        NextStep::ConfirmClientData,
        NextStep::CollectVehicleData,
        NextStep::ConfirmVehicleData,
        NextStep::CheckEligibility,
        NextStep::GenerateResponse,
        NextStep::Fallback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NextStep::CollectClientData => "collect_client_data",
            NextStep::ConfirmClientData => "confirm_client_data",
            NextStep::CollectVehicleData => "collect_vehicle_data",
            NextStep::ConfirmVehicleData => "confirm_vehicle_data",
            NextStep::CheckEligibility => "check_eligibility",
            NextStep::GenerateResponse => "generate_response",
            NextStep::Fallback => "fallback",
        }
    }

    /// Parse a model-chosen step name; anything unrecognized routes to fallback
    pub fn parse_lenient(raw: &str) -> NextStep {
        let wanted = raw.trim().trim_matches('"').to_lowercase();
        NextStep::ALL
            .into_iter()
            .find(|step| step.as_str() == wanted)
            .unwrap_or(NextStep::Fallback)
    }

    pub fn collect_for(entity: EntityKind) -> NextStep {
        match entity {
            EntityKind::Client => NextStep::CollectClientData,
            EntityKind::Vehicle => NextStep::CollectVehicleData,
        }
    }

    pub fn confirm_for(entity: EntityKind) -> NextStep {
        match entity {
            EntityKind::Client => NextStep::ConfirmClientData,
            EntityKind::Vehicle => NextStep::ConfirmVehicleData,
        }
    }
}

impl fmt::Display for NextStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Everything the assistant knows about one conversation.
///
/// Checkpointed after every turn; steps only ever see a snapshot of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// The latest user message
    pub message: String,
    /// Notes accumulated during the current turn for response generation
    pub outgoing: Vec<String>,
    pub client: ClientRecord,
    pub vehicle: VehicleRecord,
    pub confirmation: Option<ConfirmationRequest>,
    pub intent_description: Option<String>,
    pub raw_fragments: Vec<String>,
    pub next_step: NextStep,
    pub first_turn: bool,
    pub eligibility_notified: bool,
    pub history: Vec<ChatMessage>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            message: String::new(),
            outgoing: Vec::new(),
            client: ClientRecord::default(),
            vehicle: VehicleRecord::default(),
            confirmation: None,
            intent_description: None,
            raw_fragments: Vec::new(),
            next_step: NextStep::Fallback,
            first_turn: true,
            eligibility_notified: false,
            history: Vec::new(),
        }
    }
}

impl SessionState {
    /// Start a turn: record the user message and reset turn-scoped data
    pub fn begin_turn(&mut self, text: &str) {
        self.message = text.to_string();
        self.outgoing.clear();
        self.raw_fragments.clear();
        self.intent_description = None;
        self.history.push(ChatMessage::user(text));
    }

    /// Fold a step's output into the session
    pub fn apply(&mut self, delta: StateDelta) {
        let StateDelta {
            client,
            vehicle,
            confirmation,
            notes,
            intent_description,
            raw_fragments,
            next_step,
            first_turn,
            eligibility_notified,
            reply,
        } = delta;

        if let Some(client) = client {
            self.client = client;
        }
        if let Some(vehicle) = vehicle {
            self.vehicle = vehicle;
        }
        if let Some(confirmation) = confirmation {
            self.confirmation = confirmation;
        }
        self.outgoing.extend(notes);
        if let Some(intent) = intent_description {
            self.intent_description = Some(intent);
        }
        if let Some(fragments) = raw_fragments {
            self.raw_fragments = fragments;
        }
        if let Some(step) = next_step {
            self.next_step = step;
        }
        if let Some(first) = first_turn {
            self.first_turn = first;
        }
        if let Some(notified) = eligibility_notified {
            self.eligibility_notified = notified;
        }
        if let Some(reply) = reply {
            self.history.push(ChatMessage::assistant(reply));
        }
    }

    /// The pending confirmation request, if it is for the given entity
    pub fn confirmation_for(&self, entity: EntityKind) -> Option<&ConfirmationRequest> {
        self.confirmation.as_ref().filter(|c| c.entity == entity)
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Last few exchanges, oldest first, for prompting
    pub fn recent_history(&self, limit: usize) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(limit);
        self.history.get(start..).unwrap_or_default()
    }
}

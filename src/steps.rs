//! Turn steps
//!
//! Every step reads a session snapshot and returns a [`StateDelta`].
//! Failures of the model or the persistence service become notes for the
//! reply; no step returns an error.

mod collect;
mod confirm;
mod eligibility;
mod respond;
mod router;

pub use collect::collect;
pub use confirm::{confirm, Confirmable};
pub use eligibility::check_eligibility;
pub use respond::{fallback, fallback_reply, generate_response};
pub use router::{flow_context, route, FlowContext};

use crate::backend::IntakeBackend;
use crate::llm::{LlmMessage, LlmService};
use crate::state_machine::{
    ChatRole, ClientRecord, Node, SessionState, StateDelta, VehicleRecord,
};
use std::sync::Arc;

/// Internal instruction seeded on the first turn of a session
pub const WELCOME_DIRECTIVE: &str =
    "Produce a welcome greeting: introduce yourself as the vehicle intake assistant.";

pub const RETRY_NOTE: &str =
    "There was a problem processing your information. Please try again.";

/// Prior exchanges included in prompts
const HISTORY_WINDOW: usize = 8;

/// Collaborators a step may call
pub struct StepContext<'a> {
    pub session_id: &'a str,
    pub llm: &'a dyn LlmService,
    pub backend: &'a Arc<dyn IntakeBackend>,
}

/// Run the step behind `node` against a snapshot
pub async fn run_step(node: Node, state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    match node {
        Node::Router => route(state, ctx).await,
        Node::CollectClient => collect::<ClientRecord>(state, ctx).await,
        Node::ConfirmClient => confirm::<ClientRecord>(state, ctx).await,
        Node::CollectVehicle => collect::<VehicleRecord>(state, ctx).await,
        Node::ConfirmVehicle => confirm::<VehicleRecord>(state, ctx).await,
        Node::CheckEligibility => check_eligibility(state, ctx).await,
        Node::Fallback => fallback(state, ctx),
        Node::GenerateResponse => generate_response(state, ctx).await,
        Node::End => StateDelta::default(),
    }
}

/// Recent conversation as model messages, oldest first
fn history_messages(state: &SessionState) -> Vec<LlmMessage> {
    state
        .recent_history(HISTORY_WINDOW)
        .iter()
        .map(|m| match m.role {
            ChatRole::User => LlmMessage::user(m.content.clone()),
            ChatRole::Assistant => {
                LlmMessage::assistant(vec![crate::llm::ContentBlock::text(m.content.clone())])
            }
        })
        .collect()
}

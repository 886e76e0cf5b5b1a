//! Confirmation step
//!
//! The model reads the user's answer to the confirmation prompt. It may save
//! the record itself through the write tool bound to the pending record; if it
//! reports acceptance without calling the tool, the record is saved directly.

use super::{StepContext, RETRY_NOTE};
use crate::backend::{BackendResult, IntakeBackend, StoredClient, StoredVehicle};
use crate::llm::{parse_structured, LlmRequest};
use crate::state_machine::{
    ClientRecord, ConfirmationRequest, IntakeRecord, NextStep, SessionState, StateDelta,
    VehicleRecord,
};
use crate::tools::{
    run_tool_loop, save_client, save_vehicle, QueryClientTool, QueryVehicleTool, SaveClientTool,
    SaveVehicleTool, ToolContext, ToolRegistry, DEFAULT_MAX_ROUNDS,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A record that can be confirmed and persisted
#[async_trait]
pub trait Confirmable: IntakeRecord {
    /// What the record is stored under: nothing for clients, the client id for vehicles
    type Owner: Copy + Send + Sync;

    fn owner(state: &SessionState) -> Option<Self::Owner>;

    fn tools(&self, owner: Self::Owner) -> ToolRegistry;

    /// Record view of a write tool's stored entity
    fn from_stored(data: &Value) -> Option<Self>;

    async fn save(&self, owner: Self::Owner, backend: &dyn IntakeBackend) -> BackendResult<Self>;
}

#[async_trait]
impl Confirmable for ClientRecord {
    type Owner = ();

    fn owner(_state: &SessionState) -> Option<()> {
        Some(())
    }

    fn tools(&self, _owner: ()) -> ToolRegistry {
        ToolRegistry::new(vec![
            Arc::new(QueryClientTool),
            Arc::new(SaveClientTool::new(self.clone())),
        ])
    }

    fn from_stored(data: &Value) -> Option<Self> {
        serde_json::from_value::<StoredClient>(data.clone())
            .ok()
            .map(|stored| stored.to_record())
    }

    async fn save(&self, _owner: (), backend: &dyn IntakeBackend) -> BackendResult<Self> {
        save_client(backend, self).await.map(|stored| stored.to_record())
    }
}

#[async_trait]
impl Confirmable for VehicleRecord {
    type Owner = Uuid;

    fn owner(state: &SessionState) -> Option<Uuid> {
        state.client.id
    }

    fn tools(&self, client_id: Uuid) -> ToolRegistry {
        ToolRegistry::new(vec![
            Arc::new(QueryVehicleTool::new(client_id)),
            Arc::new(SaveVehicleTool::new(client_id, self.clone())),
        ])
    }

    fn from_stored(data: &Value) -> Option<Self> {
        serde_json::from_value::<StoredVehicle>(data.clone())
            .ok()
            .map(|stored| stored.to_record())
    }

    async fn save(&self, client_id: Uuid, backend: &dyn IntakeBackend) -> BackendResult<Self> {
        save_vehicle(backend, client_id, self)
            .await
            .map(|stored| stored.to_record())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
    Unclear,
}

impl Decision {
    fn parse(raw: &str) -> Decision {
        match raw.trim().to_lowercase().as_str() {
            "accept" | "accepted" | "yes" | "confirm" | "confirmed" => Decision::Accept,
            "reject" | "rejected" | "no" | "deny" | "denied" => Decision::Reject,
            _ => Decision::Unclear,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfirmAnswer {
    #[serde(default)]
    decision: String,
    #[serde(default)]
    message: String,
}

fn system_prompt(request: &ConfirmationRequest, save_tool: &str) -> String {
    format!(
        "The user was shown these {entity} details and asked to confirm them:\n{summary}\n\n\
         Read the user's answer.\n\
         - If they accept, call the {save_tool} tool exactly once, then answer with \
         decision 'accept'.\n\
         - If they reject or want to change something, do not call any write tool and \
         answer with decision 'reject'.\n\
         - If the answer is neither, answer with decision 'unclear' and ask them to \
         reply yes or no.\n\n\
         Answer with a JSON object: {{\"decision\": \"accept\" | \"reject\" | \"unclear\", \
         \"message\": string}}",
        entity = request.entity,
        summary = request.summary(),
    )
}

fn accepted<R: IntakeRecord>(saved: R, message: &str) -> StateDelta {
    let mut delta = saved
        .store(StateDelta::default())
        .clear_confirmation()
        .with_note(format!("The {} details were saved successfully.", R::KIND));
    if !message.trim().is_empty() {
        delta = delta.with_note(message.trim());
    }
    delta
}

/// Resolve the pending confirmation for `R`
pub async fn confirm<R: Confirmable>(state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    let Some(request) = state.confirmation_for(R::KIND) else {
        tracing::info!(session_id = %ctx.session_id, entity = %R::KIND, "Nothing to confirm, collecting instead");
        return StateDelta::default()
            .with_note(format!(
                "There are no {} details to confirm yet. Ask the user for the missing details.",
                R::KIND
            ))
            .with_next(NextStep::collect_for(R::KIND));
    };

    let Some(owner) = R::owner(state) else {
        tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, "Confirmation without an owning client");
        return StateDelta::default()
            .with_note(format!(
                "The {} cannot be saved before the client details are confirmed.",
                R::KIND
            ))
            .with_next(NextStep::Fallback);
    };

    let record = R::select(state);
    let registry = record.tools(owner);
    let save_tool = registry
        .definitions()
        .into_iter()
        .map(|d| d.name)
        .find(|name| registry.is_write(name))
        .unwrap_or_default();
    let llm_request = LlmRequest::new(system_prompt(request, &save_tool))
        .with_user_text(state.message.clone());
    let tool_ctx = ToolContext::new(ctx.session_id, Arc::clone(ctx.backend));

    let run = run_tool_loop(ctx.llm, llm_request, &registry, &tool_ctx, DEFAULT_MAX_ROUNDS).await;
    if let Some(e) = &run.error {
        tracing::warn!(
            session_id = %ctx.session_id,
            entity = %R::KIND,
            error = %e,
            writes = run.writes().count(),
            "Confirmation call failed"
        );
    }
    let answer = if run.error.is_none() {
        parse_structured::<ConfirmAnswer>(&run.text)
    } else {
        None
    };
    let message = answer.as_ref().map(|a| a.message.as_str()).unwrap_or("");

    // A write that reached the service is kept even if the model failed afterwards
    if run.writes().next().is_some() {
        let Some(write) = run.writes().filter(|w| w.output.success).last() else {
            tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, "Write tool failed");
            return StateDelta::default().with_note(RETRY_NOTE);
        };
        return match write.output.data.as_ref().and_then(R::from_stored) {
            Some(saved) => {
                tracing::info!(session_id = %ctx.session_id, entity = %R::KIND, tool = %write.name, "Saved through tool");
                accepted(saved, message)
            }
            None => {
                tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, "Write tool returned no record");
                StateDelta::default().with_note(RETRY_NOTE)
            }
        };
    }

    if run.error.is_some() {
        return StateDelta::default().with_note(RETRY_NOTE);
    }

    let Some(answer) = answer else {
        tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, raw = %run.text, "Confirmation answer unparseable");
        return StateDelta::default().with_note(RETRY_NOTE);
    };

    match Decision::parse(&answer.decision) {
        Decision::Accept => match record.save(owner, ctx.backend.as_ref()).await {
            Ok(saved) => accepted(saved, &answer.message),
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, error = %e, "Save failed");
                StateDelta::default().with_note(RETRY_NOTE)
            }
        },
        Decision::Reject => {
            let mut cleared = record.clone();
            cleared.clear_fields(request.field_names());
            tracing::info!(session_id = %ctx.session_id, entity = %R::KIND, "Details rejected");
            cleared
                .store(StateDelta::default())
                .clear_confirmation()
                .with_note(format!(
                    "Sorry about that. The {} details were discarded; ask the user for them again.",
                    R::KIND
                ))
                .with_next(NextStep::collect_for(R::KIND))
        }
        Decision::Unclear => {
            let note = if answer.message.trim().is_empty() {
                "Please reply yes to confirm the details or tell me what to change.".to_string()
            } else {
                answer.message.trim().to_string()
            };
            StateDelta::default().with_note(note)
        }
    }
}

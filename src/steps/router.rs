//! Supervisor / router step
//!
//! The route is computed from session state alone whenever collection,
//! confirmation or the first eligibility check is still pending. The model is
//! always asked for the user's intent and raw data fragments, but only picks
//! the route once all of that work is done.

use super::{StepContext, WELCOME_DIRECTIVE};
use crate::llm::{complete_structured, LlmRequest, ModelOutput};
use crate::state_machine::{IntakeRecord, NextStep, SessionState, StateDelta};
use serde::Deserialize;
use serde_json::Value;

/// Where the conversation stands, and the step that state alone dictates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowContext {
    pub description: String,
    pub determined: Option<NextStep>,
}

impl FlowContext {
    fn fixed(description: impl Into<String>, step: NextStep) -> Self {
        Self {
            description: description.into(),
            determined: Some(step),
        }
    }

    /// Description plus the suggested step, as shown to the model
    pub fn hint(&self) -> String {
        match self.determined {
            Some(step) => format!("{}. The suggested next step is '{step}'.", self.description),
            None => format!("{}.", self.description),
        }
    }
}

/// Pure routing decision
pub fn flow_context(state: &SessionState) -> FlowContext {
    if let Some(request) = &state.confirmation {
        return FlowContext::fixed(
            format!("Waiting for the user to confirm the {} details", request.entity),
            NextStep::confirm_for(request.entity),
        );
    }
    if !state.client.is_complete() {
        return FlowContext::fixed("Collecting client details", NextStep::CollectClientData);
    }
    if !state.vehicle.is_complete() {
        return FlowContext::fixed("Collecting vehicle details", NextStep::CollectVehicleData);
    }
    if !state.eligibility_notified {
        return FlowContext::fixed(
            "Data collection finished. The next step is evaluating eligibility",
            NextStep::CheckEligibility,
        );
    }
    FlowContext {
        description: "Data collection is finished. The user may ask for another eligibility \
                      check or to change their data"
            .to_string(),
        determined: None,
    }
}

#[derive(Debug, Deserialize)]
struct SupervisorAnswer {
    #[serde(default)]
    intent_description: String,
    #[serde(default)]
    next_step: String,
    #[serde(default)]
    extracted_data: Vec<Value>,
}

fn fragment(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s).filter(|s| !s.trim().is_empty()),
        other => Some(other.to_string()),
    }
}

fn system_prompt(flow: &FlowContext, state: &SessionState) -> String {
    let last_question = state.last_reply().unwrap_or("none");
    let options = if flow.determined.is_none() {
        let choices: Vec<String> = NextStep::ALL
            .iter()
            .filter(|s| !matches!(s, NextStep::Fallback | NextStep::GenerateResponse))
            .map(|s| format!("- '{s}'"))
            .collect();
        format!("\nNext step options:\n{}\n", choices.join("\n"))
    } else {
        String::new()
    };

    format!(
        "You supervise a vehicle intake conversation and direct its flow.\n\n\
         Decision rules:\n\
         1. While collecting data, the user's message answers the last question. \
         Describe the intent as 'user provides the requested data' and copy the data \
         fragments verbatim into extracted_data.\n\
         2. While waiting for confirmation, the message is a yes or a no. Describe the \
         intent as 'user confirms or rejects the data'.\n\
         3. Otherwise describe the user's intent in general terms.\n\n\
         Do not validate or interpret the fragments; extract them as written.\n\n\
         Current flow: {flow}\n\
         Last question asked: {last_question}\n\
         {options}\n\
         Answer with a JSON object: \
         {{\"intent_description\": string, \"next_step\": string, \"extracted_data\": [string]}}",
        flow = flow.hint(),
    )
}

/// Choose this turn's step and capture intent and raw fragments
pub async fn route(state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    let flow = flow_context(state);
    let request =
        LlmRequest::new(system_prompt(&flow, state)).with_user_text(state.message.clone());

    let mut delta = StateDelta::default();
    let answer = complete_structured::<SupervisorAnswer>(ctx.llm, request).await;

    let chosen = match answer {
        ModelOutput::Structured(answer) => {
            delta.intent_description = Some(answer.intent_description);
            delta.raw_fragments = Some(
                answer
                    .extracted_data
                    .into_iter()
                    .filter_map(fragment)
                    .collect(),
            );
            // reply generation and fallback are never offered as choices
            Some(NextStep::parse_lenient(&answer.next_step))
                .filter(|step| *step != NextStep::GenerateResponse)
        }
        ModelOutput::Raw(_) => {
            tracing::warn!(session_id = %ctx.session_id, "Supervisor answer unparseable");
            None
        }
        ModelOutput::Failed(e) => {
            tracing::warn!(session_id = %ctx.session_id, error = %e, "Supervisor call failed");
            None
        }
    };

    let next = flow
        .determined
        .or(chosen)
        .unwrap_or(NextStep::Fallback);

    tracing::info!(
        session_id = %ctx.session_id,
        next_step = %next,
        deterministic = flow.determined.is_some(),
        "Route decided"
    );

    if state.first_turn {
        delta = delta.with_note(WELCOME_DIRECTIVE);
        delta.first_turn = Some(false);
    }

    delta.with_next(next)
}

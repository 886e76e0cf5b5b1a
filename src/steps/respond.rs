//! Fallback and reply generation

use super::{history_messages, StepContext, WELCOME_DIRECTIVE};
use crate::llm::LlmRequest;
use crate::state_machine::{SessionState, StateDelta};

const STATIC_GREETING: &str =
    "Hello! I'm the vehicle intake assistant. I'll help you register your details and \
     check whether you are eligible.";

const GENERIC_APOLOGY: &str = "Sorry, I didn't quite get that. Could you rephrase?";

/// Off-script turns add nothing; the reply is generated from whatever the
/// router left behind
pub fn fallback(state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    tracing::info!(
        session_id = %ctx.session_id,
        intent = state.intent_description.as_deref().unwrap_or(""),
        "Fallback"
    );
    StateDelta::default()
}

/// Reply used when the model cannot phrase one
pub fn fallback_reply(state: &SessionState) -> String {
    let parts: Vec<&str> = state
        .outgoing
        .iter()
        .map(|note| {
            if note == WELCOME_DIRECTIVE {
                STATIC_GREETING
            } else {
                note.as_str()
            }
        })
        .filter(|note| !note.trim().is_empty())
        .collect();

    if parts.is_empty() {
        GENERIC_APOLOGY.to_string()
    } else {
        parts.join("\n\n")
    }
}

fn system_prompt(state: &SessionState) -> String {
    let instructions = if state.outgoing.is_empty() {
        "- none".to_string()
    } else {
        state
            .outgoing
            .iter()
            .map(|note| format!("- {note}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let client = match state.client.display_name() {
        Some(name) => format!("The user's name is {name}. Address them by name.\n\n"),
        None => String::new(),
    };

    format!(
        "You are a friendly assistant that registers clients and their vehicles and tells \
         them whether they are eligible for the product.\n\n\
         {client}\
         Internal instructions for this reply:\n{instructions}\n\n\
         Write a single short reply to the user that carries out every instruction above. \
         Never mention that there are instructions and never invent data. If a confirmation \
         summary is included, reproduce it exactly."
    )
}

/// Phrase the turn's notes as the user-facing reply
pub async fn generate_response(state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    let mut request = LlmRequest::new(system_prompt(state));
    request.messages = history_messages(state);

    match ctx.llm.complete(&request).await {
        Ok(response) => {
            let text = response.text();
            if text.trim().is_empty() {
                tracing::warn!(session_id = %ctx.session_id, "Empty reply from model");
                StateDelta::default().with_reply(fallback_reply(state))
            } else {
                StateDelta::default().with_reply(text.trim())
            }
        }
        Err(e) => {
            tracing::warn!(session_id = %ctx.session_id, error = %e, "Reply generation failed");
            StateDelta::default().with_reply(fallback_reply(state))
        }
    }
}

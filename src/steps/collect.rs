//! Field-collection step, shared by both entities

use super::{StepContext, RETRY_NOTE};
use crate::llm::{complete_structured, LlmRequest, ModelOutput};
use crate::state_machine::{FieldSpec, IntakeRecord, NextStep, SessionState, StateDelta};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct CollectAnswer {
    #[serde(default)]
    extracted: Map<String, Value>,
    #[serde(default)]
    question: String,
}

/// Missing fields as prompt lines; members of a group share a line
fn missing_lines(missing: &[&'static FieldSpec]) -> Vec<String> {
    let mut lines: Vec<(&str, Vec<String>)> = Vec::new();
    for spec in missing {
        let entry = format!("{} ({})", spec.description, spec.name);
        match lines.last_mut() {
            Some((group, members)) if *group == spec.group => members.push(entry),
            _ => lines.push((spec.group, vec![entry])),
        }
    }
    lines
        .into_iter()
        .map(|(_, members)| format!("- {}", members.join(" and ")))
        .collect()
}

/// Question used when the model leaves its follow-up empty
fn default_question<R: IntakeRecord>(record: &R) -> String {
    let missing = record.missing_fields();
    let Some(first) = missing.first() else {
        return format!("Please review your {} details.", R::KIND);
    };
    let asked: Vec<&str> = missing
        .iter()
        .filter(|s| s.group == first.group)
        .map(|s| s.description)
        .collect();
    format!("Could you tell me your {}?", asked.join(" and "))
}

fn system_prompt<R: IntakeRecord>(record: &R, state: &SessionState) -> String {
    let missing = missing_lines(&record.missing_fields());
    let known = record.confirmation_request().summary();
    let fields: Vec<&str> = R::field_specs().iter().map(|s| s.name).collect();

    format!(
        "Your task is to fill in the {kind} details. The user's message answers a question \
         about the first missing item in the list below.\n\n\
         Missing details, in priority order:\n{missing}\n\n\
         Details already known:\n{known}\n\n\
         User intent: {intent}\n\
         Raw fragments from the message: {fragments}\n\
         Last question asked: {last}\n\n\
         Instructions:\n\
         1. Assign the user's message to the first missing item when it plausibly answers it.\n\
         2. Extract any other details the message contains as well.\n\
         3. Dates use YYYY-MM-DD. Document type is one of DNI, CUIT, CUIL.\n\
         4. Then write one clear question asking for the next missing item.\n\
         5. If nothing is missing any more, leave the question empty.\n\n\
         Answer with a JSON object: {{\"extracted\": {{...}}, \"question\": string}}. \
         Valid keys for extracted: {keys}. Omit keys you could not extract.",
        kind = R::KIND,
        missing = if missing.is_empty() { "- none".to_string() } else { missing.join("\n") },
        known = if known.is_empty() { "- none" } else { known.as_str() },
        intent = state.intent_description.as_deref().unwrap_or("unknown"),
        fragments = if state.raw_fragments.is_empty() {
            "none".to_string()
        } else {
            state.raw_fragments.join(" | ")
        },
        last = state.last_reply().unwrap_or("none"),
        keys = fields.join(", "),
    )
}

/// Merge what the user just said into the record and ask for what is left.
///
/// Once every collectible field is present the record is put up for
/// confirmation instead.
pub async fn collect<R: IntakeRecord>(state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    let current = R::select(state);
    let request =
        LlmRequest::new(system_prompt(current, state)).with_user_text(state.message.clone());

    let answer = match complete_structured::<CollectAnswer>(ctx.llm, request).await {
        ModelOutput::Structured(answer) => answer,
        ModelOutput::Raw(text) => {
            tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, raw = %text, "Collection answer unparseable");
            return StateDelta::default()
                .with_note(RETRY_NOTE)
                .with_next(NextStep::GenerateResponse);
        }
        ModelOutput::Failed(e) => {
            tracing::warn!(session_id = %ctx.session_id, entity = %R::KIND, error = %e, "Collection call failed");
            return StateDelta::default()
                .with_note(RETRY_NOTE)
                .with_next(NextStep::GenerateResponse);
        }
    };

    let mut record = current.clone();
    for rejected in record.merge_extracted(&answer.extracted) {
        tracing::debug!(session_id = %ctx.session_id, field = %rejected.field, reason = %rejected.reason, "Extracted value dropped");
    }

    if record.ready_for_confirmation() {
        let request = record.confirmation_request();
        tracing::info!(session_id = %ctx.session_id, entity = %R::KIND, "Record ready for confirmation");
        return record
            .store(StateDelta::default())
            .with_note(request.prompt())
            .with_confirmation(request)
            .with_next(NextStep::confirm_for(R::KIND));
    }

    let question = if answer.question.trim().is_empty() {
        default_question(&record)
    } else {
        answer.question.trim().to_string()
    };
    record.store(StateDelta::default()).with_note(question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IntakeBackend, MemoryBackend};
    use crate::llm::{LlmError, LlmResponse};
    use crate::runtime::testing::MockLlmClient;
    use crate::state_machine::{
        ClientRecord, DocumentType, EntityKind, VehicleRecord,
    };
    use chrono::NaiveDate;
    use std::sync::Arc;

    async fn run<R: IntakeRecord>(state: &SessionState, llm: &MockLlmClient) -> StateDelta {
        let backend: Arc<dyn IntakeBackend> = Arc::new(MemoryBackend::new());
        let ctx = StepContext {
            session_id: "s1",
            llm,
            backend: &backend,
        };
        collect::<R>(state, &ctx).await
    }

    #[test]
    fn test_missing_lines_group_members() {
        let lines = missing_lines(&ClientRecord::default().missing_fields());
        assert_eq!(lines[0], "- first name (name) and last name (last_name)");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_default_question_asks_whole_group() {
        let record = ClientRecord {
            name: Some("Ana".into()),
            last_name: Some("Gomez".into()),
            ..Default::default()
        };
        assert_eq!(
            default_question(&record),
            "Could you tell me your document number and document type (DNI, CUIT or CUIL)?"
        );
    }

    #[tokio::test]
    async fn test_partial_extraction_asks_next() {
        let llm = MockLlmClient::new("mock");
        llm.queue_response(LlmResponse::from_text(
            r#"{"extracted": {"name": "Ana", "last_name": "Gomez"}, "question": "What is your document number?"}"#,
        ));

        let state = SessionState {
            message: "Ana Gomez".into(),
            ..Default::default()
        };
        let delta = run::<ClientRecord>(&state, &llm).await;

        let client = delta.client.unwrap();
        assert_eq!(client.name.as_deref(), Some("Ana"));
        assert_eq!(delta.notes, vec!["What is your document number?".to_string()]);
        assert_eq!(delta.confirmation, None);
        assert_eq!(delta.next_step, None);
    }

    #[tokio::test]
    async fn test_completion_creates_confirmation() {
        let llm = MockLlmClient::new("mock");
        llm.queue_response(LlmResponse::from_text(
            r#"```json
{"extracted": {"phone": "1155550000"}, "question": ""}
```"#,
        ));

        let state = SessionState {
            message: "1155550000".into(),
            client: ClientRecord {
                name: Some("Ana".into()),
                last_name: Some("Gomez".into()),
                birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
                document_number: Some("30111222".into()),
                document_type: Some(DocumentType::Dni),
                email: Some("ana@example.com".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let delta = run::<ClientRecord>(&state, &llm).await;

        let request = delta.confirmation.clone().flatten().unwrap();
        assert_eq!(request.entity, EntityKind::Client);
        assert_eq!(request.fields.len(), 7);
        assert_eq!(delta.next_step, Some(NextStep::ConfirmClientData));
        assert!(delta.notes[0].contains("- phone number: 1155550000"));
    }

    #[tokio::test]
    async fn test_vehicle_waits_for_mileage_before_confirming() {
        let llm = MockLlmClient::new("mock");
        llm.queue_response(LlmResponse::from_text(
            r#"{"extracted": {"year": 2020}, "question": ""}"#,
        ));

        let state = SessionState {
            vehicle: VehicleRecord {
                license_plate: Some("AB123CD".into()),
                brand: Some("Toyota".into()),
                model: Some("Corolla".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let delta = run::<VehicleRecord>(&state, &llm).await;
        assert_eq!(delta.confirmation, None);
        assert_eq!(delta.notes, vec!["Could you tell me your mileage (km)?".to_string()]);
    }

    #[tokio::test]
    async fn test_extraction_never_erases() {
        let llm = MockLlmClient::new("mock");
        llm.queue_response(LlmResponse::from_text(
            r#"{"extracted": {"name": null, "email": "not-an-email"}, "question": "And your last name?"}"#,
        ));

        let state = SessionState {
            client: ClientRecord {
                name: Some("Ana".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let delta = run::<ClientRecord>(&state, &llm).await;
        let client = delta.client.unwrap();
        assert_eq!(client.name.as_deref(), Some("Ana"));
        assert_eq!(client.email, None);
    }

    #[tokio::test]
    async fn test_model_failure_leaves_record_alone() {
        let llm = MockLlmClient::new("mock");
        llm.queue_error(LlmError::rate_limit("slow down"));
        let state = SessionState {
            client: ClientRecord {
                name: Some("Ana".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let delta = run::<ClientRecord>(&state, &llm).await;
        assert_eq!(delta.client, None);
        assert_eq!(delta.notes, vec![RETRY_NOTE.to_string()]);
        assert_eq!(delta.next_step, Some(NextStep::GenerateResponse));

        llm.queue_response(LlmResponse::from_text("Sure, noted your name!"));
        let delta = run::<ClientRecord>(&state, &llm).await;
        assert_eq!(delta.client, None);
        assert_eq!(delta.notes, vec![RETRY_NOTE.to_string()]);
    }
}

//! Turn executor

use super::traits::CheckpointStore;
use super::RuntimeError;
use crate::backend::IntakeBackend;
use crate::llm::LlmService;
use crate::state_machine::{transition, ChatRole, Node, SessionState};
use crate::steps::{run_step, StepContext};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Node executions allowed in one turn; the graph needs three
pub const MAX_HOPS: usize = 4;

/// Runs turns against checkpointed sessions
pub struct TurnRunner<S: CheckpointStore> {
    llm: Arc<dyn LlmService>,
    backend: Arc<dyn IntakeBackend>,
    store: S,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: CheckpointStore> TurnRunner<S> {
    pub fn new(llm: Arc<dyn LlmService>, backend: Arc<dyn IntakeBackend>, store: S) -> Self {
        Self {
            llm,
            backend,
            store,
            locks: RwLock::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(session_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Save a fresh session so it can be fetched before its first message
    pub async fn create_session(&self, session_id: &str) -> Result<SessionState, RuntimeError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        if let Some(existing) = self.load(session_id).await? {
            return Ok(existing);
        }
        let state = SessionState::default();
        self.store
            .save(session_id, &state)
            .await
            .map_err(RuntimeError::Checkpoint)?;
        tracing::info!(session_id, "Session created");
        Ok(state)
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionState, RuntimeError> {
        self.load(session_id)
            .await?
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_string()))
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, RuntimeError> {
        self.store
            .load(session_id)
            .await
            .map_err(RuntimeError::Checkpoint)
    }

    /// Process one user message and return the assistant's reply.
    ///
    /// Unknown sessions start fresh. The checkpoint is written only after the
    /// turn reached `end`.
    pub async fn handle_message(&self, session_id: &str, text: &str) -> Result<String, RuntimeError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load(session_id).await?.unwrap_or_default();
        state.begin_turn(text);
        let history_len = state.history.len();

        let ctx = StepContext {
            session_id,
            llm: self.llm.as_ref(),
            backend: &self.backend,
        };

        let mut node = Node::Router;
        let mut hops = 0;
        while !node.is_terminal() {
            hops += 1;
            if hops > MAX_HOPS {
                return Err(RuntimeError::HopLimit(MAX_HOPS));
            }
            let delta = run_step(node, &state, &ctx).await;
            state.apply(delta);
            let next = transition(node, &state)?;
            tracing::debug!(session_id, from = %node, to = %next, "Transition");
            node = next;
        }

        let reply = state
            .history
            .get(history_len..)
            .and_then(|appended| appended.iter().rev().find(|m| m.role == ChatRole::Assistant))
            .map(|m| m.content.clone())
            .ok_or(RuntimeError::NoReply)?;

        self.store
            .save(session_id, &state)
            .await
            .map_err(RuntimeError::Checkpoint)?;

        tracing::info!(
            session_id,
            hops,
            next_step = %state.next_step,
            notes = state.outgoing.len(),
            "Turn complete"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, WriteCall};
    use crate::llm::{ContentBlock, LlmError, LlmResponse, Usage};
    use crate::runtime::testing::{FailingCheckpointStore, MockLlmClient};
    use crate::runtime::InMemoryCheckpointStore;
    use crate::state_machine::{IntakeRecord, NextStep};
    use serde_json::json;
    use std::time::Duration;

    fn supervisor(next: &str) -> LlmResponse {
        LlmResponse::from_text(format!(
            r#"{{"intent_description": "provides data", "next_step": "{next}", "extracted_data": []}}"#
        ))
    }

    fn runner(
        llm: Arc<MockLlmClient>,
        backend: Arc<MemoryBackend>,
    ) -> TurnRunner<Arc<InMemoryCheckpointStore>> {
        TurnRunner::new(llm, backend, Arc::new(InMemoryCheckpointStore::new()))
    }

    #[tokio::test]
    async fn test_first_turn_greets_and_asks() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_response(supervisor("collect_client_data"));
        llm.queue_response(LlmResponse::from_text(
            r#"{"extracted": {}, "question": "What is your full name?"}"#,
        ));
        llm.queue_response(LlmResponse::from_text("Hi! What is your full name?"));

        let runner = runner(llm.clone(), Arc::new(MemoryBackend::new()));
        let reply = runner.handle_message("s1", "hola").await.unwrap();
        assert_eq!(reply, "Hi! What is your full name?");

        let state = runner.snapshot("s1").await.unwrap();
        assert!(!state.first_turn);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.outgoing.len(), 2);

        // reply generation saw the welcome directive as an instruction
        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].system.contains("welcome greeting"));
    }

    #[tokio::test]
    async fn test_full_intake_conversation() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        let backend = Arc::new(MemoryBackend::new());
        let runner = runner(llm.clone(), backend.clone());

        // client details in one message
        llm.queue_response(supervisor("collect_client_data"));
        llm.queue_response(LlmResponse::from_text(
            json!({"extracted": {
                "name": "Ana", "last_name": "Gomez", "document_number": "30111222",
                "document_type": "DNI", "birth_date": "1990-04-02",
                "email": "ana@example.com", "phone": "1155550000"
            }, "question": ""})
            .to_string(),
        ));
        llm.queue_response(LlmResponse::from_text("Please confirm your details."));
        runner.handle_message("s1", "Ana Gomez, DNI 30111222...").await.unwrap();
        let state = runner.snapshot("s1").await.unwrap();
        assert_eq!(state.next_step, NextStep::ConfirmClientData);
        assert!(state.confirmation.is_some());

        // confirm through the write tool
        llm.queue_response(supervisor("confirm_client_data"));
        llm.queue_response(LlmResponse {
            content: vec![ContentBlock::tool_use("c1", "insert_client", json!({}))],
            end_turn: false,
            usage: Usage::default(),
        });
        llm.queue_response(LlmResponse::from_text(r#"{"decision": "accept", "message": ""}"#));
        llm.queue_response(LlmResponse::from_text("Saved! Now your vehicle."));
        runner.handle_message("s1", "yes").await.unwrap();
        let state = runner.snapshot("s1").await.unwrap();
        assert!(state.client.is_complete());
        assert!(state.confirmation.is_none());

        // vehicle, then direct accept
        llm.queue_response(supervisor("collect_vehicle_data"));
        llm.queue_response(LlmResponse::from_text(
            json!({"extracted": {
                "license_plate": "ab123cd", "brand": "Toyota", "model": "Corolla",
                "year": 2020, "mileage": "50.000"
            }, "question": ""})
            .to_string(),
        ));
        llm.queue_response(LlmResponse::from_text("Please confirm the vehicle."));
        runner.handle_message("s1", "Toyota Corolla 2020...").await.unwrap();

        llm.queue_response(supervisor("confirm_vehicle_data"));
        llm.queue_response(LlmResponse::from_text(r#"{"decision": "yes", "message": ""}"#));
        llm.queue_response(LlmResponse::from_text("Vehicle saved."));
        runner.handle_message("s1", "correct").await.unwrap();
        let state = runner.snapshot("s1").await.unwrap();
        assert!(state.vehicle.is_complete());
        assert_eq!(state.vehicle.license_plate.as_deref(), Some("AB123CD"));

        // eligibility
        llm.queue_response(supervisor("fallback"));
        llm.queue_response(LlmResponse::from_text("You are eligible!"));
        let reply = runner.handle_message("s1", "am I eligible?").await.unwrap();
        assert_eq!(reply, "You are eligible!");
        let state = runner.snapshot("s1").await.unwrap();
        assert!(state.eligibility_notified);
        assert!(state.outgoing[0].starts_with("Congratulations, Ana"));

        assert_eq!(
            backend.writes(),
            vec![WriteCall::CreateClient, WriteCall::CreateVehicle]
        );
        // one user and one assistant message per turn
        assert_eq!(state.history.len(), 10);
    }

    #[tokio::test]
    async fn test_saved_client_survives_model_failure() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        let backend = Arc::new(MemoryBackend::new());
        let runner = runner(llm.clone(), backend.clone());

        llm.queue_response(supervisor("collect_client_data"));
        llm.queue_response(LlmResponse::from_text(
            json!({"extracted": {
                "name": "Ana", "last_name": "Gomez", "document_number": "30111222",
                "document_type": "DNI", "birth_date": "1990-04-02",
                "email": "ana@example.com", "phone": "1155550000"
            }, "question": ""})
            .to_string(),
        ));
        llm.queue_response(LlmResponse::from_text("Please confirm your details."));
        runner.handle_message("s1", "Ana Gomez, DNI 30111222...").await.unwrap();

        // the insert reaches the service, then the model connection drops
        llm.queue_response(supervisor("confirm_client_data"));
        llm.queue_response(LlmResponse {
            content: vec![ContentBlock::tool_use("c1", "insert_client", json!({}))],
            end_turn: false,
            usage: Usage::default(),
        });
        llm.queue_error(LlmError::network("connection reset"));
        llm.queue_response(LlmResponse::from_text("Saved! Now your vehicle."));
        runner.handle_message("s1", "yes").await.unwrap();

        let state = runner.snapshot("s1").await.unwrap();
        assert!(state.client.id.is_some());
        assert!(state.confirmation.is_none());

        // next turn moves on to the vehicle instead of inserting again
        llm.queue_response(supervisor("confirm_client_data"));
        llm.queue_response(LlmResponse::from_text(
            r#"{"extracted": {}, "question": "What is the license plate?"}"#,
        ));
        llm.queue_response(LlmResponse::from_text("What is the license plate?"));
        runner.handle_message("s1", "ok").await.unwrap();

        let state = runner.snapshot("s1").await.unwrap();
        assert_eq!(state.next_step, NextStep::CollectVehicleData);
        assert_eq!(backend.writes(), vec![WriteCall::CreateClient]);
    }

    #[tokio::test]
    async fn test_every_failure_still_replies() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        for _ in 0..3 {
            llm.queue_error(LlmError::network("offline"));
        }
        let runner = runner(llm, Arc::new(MemoryBackend::new()));

        let reply = runner.handle_message("s1", "hola").await.unwrap();
        assert!(reply.contains("There was a problem processing your information"));

        let state = runner.snapshot("s1").await.unwrap();
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.client, Default::default());
    }

    #[tokio::test]
    async fn test_create_session_is_idempotent() {
        let runner = runner(
            Arc::new(MockLlmClient::new("mock")),
            Arc::new(MemoryBackend::new()),
        );
        assert!(matches!(
            runner.snapshot("s1").await,
            Err(RuntimeError::SessionNotFound(_))
        ));
        runner.create_session("s1").await.unwrap();
        let state = runner.create_session("s1").await.unwrap();
        assert!(state.first_turn);
    }

    #[tokio::test]
    async fn test_same_session_turns_are_serialized() {
        let llm = Arc::new(
            MockLlmClient::new("mock").with_delay(Duration::from_millis(20)),
        );
        for _ in 0..2 {
            llm.queue_response(supervisor("collect_client_data"));
            llm.queue_response(LlmResponse::from_text(
                r#"{"extracted": {}, "question": "Name?"}"#,
            ));
            llm.queue_response(LlmResponse::from_text("Name?"));
        }
        let runner = Arc::new(runner(llm, Arc::new(MemoryBackend::new())));

        let a = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.handle_message("s1", "one").await }
        });
        let b = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.handle_message("s1", "two").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // neither turn overwrote the other's checkpoint
        let state = runner.snapshot("s1").await.unwrap();
        assert_eq!(state.history.len(), 4);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_an_error() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        let runner = TurnRunner::new(llm, Arc::new(MemoryBackend::new()), FailingCheckpointStore);
        let err = runner.handle_message("s1", "hola").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Checkpoint(_)));
    }
}

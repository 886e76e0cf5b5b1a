//! Test doubles and fixtures for runtime and step tests

use super::traits::CheckpointStore;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::state_machine::{ClientRecord, DocumentType, SessionState, VehicleRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Mock LLM
// ============================================================================

/// Queue-driven model; an empty queue answers with a network error
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    delay: Option<Duration>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

#[allow(dead_code)]
impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Failing checkpoint store
// ============================================================================

/// Loads nothing and refuses every save
pub struct FailingCheckpointStore;

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    async fn load(&self, _session_id: &str) -> Result<Option<SessionState>, String> {
        Ok(None)
    }

    async fn save(&self, _session_id: &str, _state: &SessionState) -> Result<(), String> {
        Err("disk full".to_string())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A persisted client with every field filled
pub fn complete_client() -> ClientRecord {
    ClientRecord {
        id: Some(Uuid::new_v4()),
        name: Some("Ana".into()),
        last_name: Some("Gomez".into()),
        birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
        document_number: Some("30111222".into()),
        document_type: Some(DocumentType::Dni),
        email: Some("ana@example.com".into()),
        phone: Some("1155550000".into()),
    }
}

/// A persisted vehicle with every field filled
pub fn complete_vehicle() -> VehicleRecord {
    VehicleRecord {
        id: Some(Uuid::new_v4()),
        license_plate: Some("AB123CD".into()),
        brand: Some("Toyota".into()),
        model: Some("Corolla".into()),
        year: Some(2020),
        mileage: Some(50_000),
    }
}

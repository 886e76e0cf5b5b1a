//! Persistence service contract
//!
//! The assistant never stores clients or vehicles itself. It talks to a CRUD
//! service through [`IntakeBackend`]; reads of unknown ids are `None`, write
//! failures are errors the confirmation step recovers from.

mod eligibility;
mod http;
mod memory;
mod types;

pub use eligibility::{age_on, evaluate_eligibility, not_found_report};
pub use http::HttpBackend;
pub use memory::{MemoryBackend, WriteCall};
pub use types::{
    ClientPayload, EligibilityReport, EligibilityRequest, StoredClient, StoredVehicle,
    VehiclePayload,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Persistence service unreachable: {0}")]
    Transport(String),
    #[error("Persistence service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("Failed to decode persistence response: {0}")]
    Decode(String),
    #[error("Record is missing required fields: {0}")]
    Incomplete(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Operations the assistant consumes from the persistence service
#[async_trait]
pub trait IntakeBackend: Send + Sync {
    async fn create_client(&self, client: &ClientPayload) -> BackendResult<StoredClient>;

    async fn get_client(&self, id: Uuid) -> BackendResult<Option<StoredClient>>;

    async fn list_clients(&self) -> BackendResult<Vec<StoredClient>>;

    async fn update_client(&self, id: Uuid, client: &ClientPayload)
        -> BackendResult<StoredClient>;

    /// `false` when the client did not exist
    async fn delete_client(&self, id: Uuid) -> BackendResult<bool>;

    async fn create_vehicle(&self, vehicle: &VehiclePayload) -> BackendResult<StoredVehicle>;

    async fn get_vehicle(&self, id: Uuid) -> BackendResult<Option<StoredVehicle>>;

    async fn list_client_vehicles(&self, client_id: Uuid) -> BackendResult<Vec<StoredVehicle>>;

    async fn update_vehicle(
        &self,
        id: Uuid,
        vehicle: &VehiclePayload,
    ) -> BackendResult<StoredVehicle>;

    async fn check_eligibility(
        &self,
        client_id: Uuid,
        vehicle_id: Uuid,
    ) -> BackendResult<EligibilityReport>;

    /// Cheap reachability probe used at startup
    async fn health_check(&self) -> BackendResult<()>;
}

/// Which backend to talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Http { base_url: String },
    Memory,
}

impl BackendConfig {
    /// `INTAKE_BACKEND` (`http` default, or `memory`) and `API_URL`
    pub fn from_env() -> Self {
        match std::env::var("INTAKE_BACKEND").ok().as_deref().map(str::trim) {
            Some("memory") => BackendConfig::Memory,
            _ => BackendConfig::Http {
                base_url: std::env::var("API_URL")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            },
        }
    }

    pub fn build(&self) -> BackendResult<Arc<dyn IntakeBackend>> {
        match self {
            BackendConfig::Http { base_url } => Ok(Arc::new(HttpBackend::new(base_url)?)),
            BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        }
    }
}

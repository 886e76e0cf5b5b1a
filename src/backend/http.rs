//! REST client for the persistence service

use super::types::{
    ClientPayload, EligibilityReport, EligibilityRequest, StoredClient, StoredVehicle,
    VehiclePayload,
};
use super::{BackendError, BackendResult, IntakeBackend};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Decode a success body, or turn the status into an error
async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// 404 is absence, not failure
async fn decode_optional<T: DeserializeOwned>(response: Response) -> BackendResult<Option<T>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    decode(response).await.map(Some)
}

fn not_found_on_write(entity: &'static str, id: Uuid, response: &Response) -> BackendResult<()> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound { entity, id });
    }
    Ok(())
}

#[async_trait]
impl IntakeBackend for HttpBackend {
    async fn create_client(&self, client: &ClientPayload) -> BackendResult<StoredClient> {
        let response = self
            .client
            .post(self.url("/api/clients/"))
            .json(client)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_client(&self, id: Uuid) -> BackendResult<Option<StoredClient>> {
        let response = self
            .client
            .get(self.url(&format!("/api/clients/{id}")))
            .send()
            .await?;
        decode_optional(response).await
    }

    async fn list_clients(&self) -> BackendResult<Vec<StoredClient>> {
        let response = self.client.get(self.url("/api/clients/")).send().await?;
        decode(response).await
    }

    async fn update_client(&self, id: Uuid, client: &ClientPayload) -> BackendResult<StoredClient> {
        let response = self
            .client
            .put(self.url(&format!("/api/clients/{id}")))
            .json(client)
            .send()
            .await?;
        not_found_on_write("client", id, &response)?;
        decode(response).await
    }

    async fn delete_client(&self, id: Uuid) -> BackendResult<bool> {
        let response = self
            .client
            .delete(self.url(&format!("/api/clients/{id}")))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(BackendError::Status {
                status: s.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn create_vehicle(&self, vehicle: &VehiclePayload) -> BackendResult<StoredVehicle> {
        let response = self
            .client
            .post(self.url("/api/vehicles/"))
            .json(vehicle)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_vehicle(&self, id: Uuid) -> BackendResult<Option<StoredVehicle>> {
        let response = self
            .client
            .get(self.url(&format!("/api/vehicles/{id}")))
            .send()
            .await?;
        decode_optional(response).await
    }

    async fn list_client_vehicles(&self, client_id: Uuid) -> BackendResult<Vec<StoredVehicle>> {
        let response = self
            .client
            .get(self.url(&format!("/api/vehicles/client/{client_id}")))
            .send()
            .await?;
        decode(response).await
    }

    async fn update_vehicle(
        &self,
        id: Uuid,
        vehicle: &VehiclePayload,
    ) -> BackendResult<StoredVehicle> {
        let response = self
            .client
            .put(self.url(&format!("/api/vehicles/{id}")))
            .json(vehicle)
            .send()
            .await?;
        not_found_on_write("vehicle", id, &response)?;
        decode(response).await
    }

    async fn check_eligibility(
        &self,
        client_id: Uuid,
        vehicle_id: Uuid,
    ) -> BackendResult<EligibilityReport> {
        let response = self
            .client
            .post(self.url("/api/eligibility/check"))
            .json(&EligibilityRequest {
                client_id,
                vehicle_id,
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn health_check(&self) -> BackendResult<()> {
        let response = self.client.get(self.url("/api/clients/")).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

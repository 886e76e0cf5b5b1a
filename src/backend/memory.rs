//! In-process persistence service
//!
//! Same contract as the REST service. Used for offline runs and tests; tests
//! can also inject write failures and inspect which writes happened.

use super::eligibility::{evaluate_eligibility, not_found_report};
use super::types::{
    ClientPayload, EligibilityReport, StoredClient, StoredVehicle, VehiclePayload,
};
use super::{BackendError, BackendResult, IntakeBackend};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// A write the backend accepted (or refused, when failure was injected)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    CreateClient,
    UpdateClient(Uuid),
    CreateVehicle,
    UpdateVehicle(Uuid),
}

#[derive(Default)]
struct Tables {
    clients: HashMap<Uuid, StoredClient>,
    vehicles: HashMap<Uuid, StoredVehicle>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    writes: Mutex<Vec<WriteCall>>,
    failing_writes: AtomicUsize,
    today: Option<NaiveDate>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate eligibility as of a fixed date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// The next `count` writes fail with a 503
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Every write attempted so far, in order
    pub fn writes(&self) -> Vec<WriteCall> {
        lock(&self.writes).clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.tables)
    }

    fn record_write(&self, call: WriteCall) -> BackendResult<()> {
        lock(&self.writes).push(call);
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BackendError::Status {
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn conflict(message: String) -> BackendError {
    BackendError::Status {
        status: 409,
        body: message,
    }
}

/// Document number and email are unique across clients
fn check_client_unique(
    tables: &Tables,
    payload: &ClientPayload,
    except: Option<Uuid>,
) -> BackendResult<()> {
    for other in tables.clients.values() {
        if Some(other.id) == except {
            continue;
        }
        if other.documento.as_deref() == Some(payload.documento.as_str()) {
            return Err(conflict(format!(
                "document {} already registered",
                payload.documento
            )));
        }
        if other.email.as_deref() == Some(payload.email.as_str()) {
            return Err(conflict(format!("email {} already registered", payload.email)));
        }
    }
    Ok(())
}

fn with_vehicles(tables: &Tables, client: &StoredClient) -> StoredClient {
    let mut client = client.clone();
    client.vehicles = tables
        .vehicles
        .values()
        .filter(|v| v.client_id == Some(client.id))
        .cloned()
        .collect();
    client
}

#[async_trait]
impl IntakeBackend for MemoryBackend {
    async fn create_client(&self, client: &ClientPayload) -> BackendResult<StoredClient> {
        self.record_write(WriteCall::CreateClient)?;
        let mut tables = self.tables();
        check_client_unique(&tables, client, None)?;

        let now = Utc::now();
        let stored = StoredClient {
            id: Uuid::new_v4(),
            name: Some(client.name.clone()),
            last_name: Some(client.last_name.clone()),
            birth_date: Some(client.birth_date),
            documento: Some(client.documento.clone()),
            documento_type: Some(client.documento_type),
            email: Some(client.email.clone()),
            phone_number: client.phone_number.clone(),
            vehicles: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.clients.insert(stored.id, stored.clone());
        tracing::debug!(client_id = %stored.id, "Client created");
        Ok(stored)
    }

    async fn get_client(&self, id: Uuid) -> BackendResult<Option<StoredClient>> {
        let tables = self.tables();
        Ok(tables.clients.get(&id).map(|c| with_vehicles(&tables, c)))
    }

    async fn list_clients(&self) -> BackendResult<Vec<StoredClient>> {
        let tables = self.tables();
        let mut clients: Vec<_> = tables
            .clients
            .values()
            .map(|c| with_vehicles(&tables, c))
            .collect();
        clients.sort_by_key(|c| c.created_at);
        Ok(clients)
    }

    async fn update_client(&self, id: Uuid, client: &ClientPayload) -> BackendResult<StoredClient> {
        self.record_write(WriteCall::UpdateClient(id))?;
        let mut tables = self.tables();
        check_client_unique(&tables, client, Some(id))?;

        let stored = tables
            .clients
            .get_mut(&id)
            .ok_or(BackendError::NotFound { entity: "client", id })?;
        stored.name = Some(client.name.clone());
        stored.last_name = Some(client.last_name.clone());
        stored.birth_date = Some(client.birth_date);
        stored.documento = Some(client.documento.clone());
        stored.documento_type = Some(client.documento_type);
        stored.email = Some(client.email.clone());
        stored.phone_number = client.phone_number.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_client(&self, id: Uuid) -> BackendResult<bool> {
        let mut tables = self.tables();
        let existed = tables.clients.remove(&id).is_some();
        if existed {
            tables.vehicles.retain(|_, v| v.client_id != Some(id));
        }
        Ok(existed)
    }

    async fn create_vehicle(&self, vehicle: &VehiclePayload) -> BackendResult<StoredVehicle> {
        self.record_write(WriteCall::CreateVehicle)?;
        let mut tables = self.tables();
        if !tables.clients.contains_key(&vehicle.client_id) {
            return Err(BackendError::NotFound {
                entity: "client",
                id: vehicle.client_id,
            });
        }

        let now = Utc::now();
        let stored = StoredVehicle {
            id: Uuid::new_v4(),
            client_id: Some(vehicle.client_id),
            license_plate: Some(vehicle.license_plate.clone()),
            brand: Some(vehicle.brand.clone()),
            model: Some(vehicle.model.clone()),
            year: Some(vehicle.year),
            mileage: Some(vehicle.mileage),
            created_at: now,
            updated_at: now,
        };
        tables.vehicles.insert(stored.id, stored.clone());
        tracing::debug!(vehicle_id = %stored.id, client_id = %vehicle.client_id, "Vehicle created");
        Ok(stored)
    }

    async fn get_vehicle(&self, id: Uuid) -> BackendResult<Option<StoredVehicle>> {
        Ok(self.tables().vehicles.get(&id).cloned())
    }

    async fn list_client_vehicles(&self, client_id: Uuid) -> BackendResult<Vec<StoredVehicle>> {
        let tables = self.tables();
        let mut vehicles: Vec<_> = tables
            .vehicles
            .values()
            .filter(|v| v.client_id == Some(client_id))
            .cloned()
            .collect();
        vehicles.sort_by_key(|v| v.created_at);
        Ok(vehicles)
    }

    async fn update_vehicle(
        &self,
        id: Uuid,
        vehicle: &VehiclePayload,
    ) -> BackendResult<StoredVehicle> {
        self.record_write(WriteCall::UpdateVehicle(id))?;
        let mut tables = self.tables();
        let stored = tables
            .vehicles
            .get_mut(&id)
            .ok_or(BackendError::NotFound { entity: "vehicle", id })?;
        stored.client_id = Some(vehicle.client_id);
        stored.license_plate = Some(vehicle.license_plate.clone());
        stored.brand = Some(vehicle.brand.clone());
        stored.model = Some(vehicle.model.clone());
        stored.year = Some(vehicle.year);
        stored.mileage = Some(vehicle.mileage);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn check_eligibility(
        &self,
        client_id: Uuid,
        vehicle_id: Uuid,
    ) -> BackendResult<EligibilityReport> {
        let tables = self.tables();
        let report = match (tables.clients.get(&client_id), tables.vehicles.get(&vehicle_id)) {
            (Some(client), Some(vehicle)) => evaluate_eligibility(client, vehicle, self.today()),
            _ => not_found_report(),
        };
        Ok(report)
    }

    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}

//! Vehicle persistence tools

use super::{Tool, ToolContext, ToolOutput, WriteMode, WriteOnce};
use crate::backend::{BackendResult, IntakeBackend, StoredVehicle, VehiclePayload};
use crate::state_machine::VehicleRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Insert the record under `client_id` if it has no id, else update it
pub async fn save_vehicle(
    backend: &dyn IntakeBackend,
    client_id: Uuid,
    record: &VehicleRecord,
) -> BackendResult<StoredVehicle> {
    let payload = VehiclePayload::from_record(client_id, record)?;
    match WriteMode::for_id(record.id) {
        WriteMode::Insert => backend.create_vehicle(&payload).await,
        WriteMode::Update(id) => backend.update_vehicle(id, &payload).await,
    }
}

/// Look up one of the client's vehicles by license plate
pub struct QueryVehicleTool {
    client_id: Uuid,
}

impl QueryVehicleTool {
    pub fn new(client_id: Uuid) -> Self {
        Self { client_id }
    }
}

#[derive(Debug, Deserialize)]
struct QueryVehicleInput {
    license_plate: String,
}

fn same_plate(a: &str, b: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_uppercase)
            .collect::<String>()
    };
    normalize(a) == normalize(b)
}

#[async_trait]
impl Tool for QueryVehicleTool {
    fn name(&self) -> &'static str {
        "query_vehicle"
    }

    fn description(&self) -> String {
        "Look up a vehicle already registered for this client by license plate. Read-only."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["license_plate"],
            "properties": {
                "license_plate": {
                    "type": "string",
                    "description": "The vehicle's license plate"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: QueryVehicleInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        match ctx.backend.list_client_vehicles(self.client_id).await {
            Ok(vehicles) => match vehicles.into_iter().find(|v| {
                v.license_plate
                    .as_deref()
                    .is_some_and(|p| same_plate(p, &input.license_plate))
            }) {
                Some(vehicle) => ToolOutput::success(format!("Vehicle found: {}", vehicle.id))
                    .with_data(json!(vehicle)),
                None => ToolOutput::success("No vehicle with that plate for this client"),
            },
            Err(e) => ToolOutput::error(format!("Lookup failed: {e}")),
        }
    }
}

/// Persist the pending vehicle record under its owner
pub struct SaveVehicleTool {
    client_id: Uuid,
    record: VehicleRecord,
    once: WriteOnce,
}

impl SaveVehicleTool {
    pub fn new(client_id: Uuid, record: VehicleRecord) -> Self {
        Self {
            client_id,
            record,
            once: WriteOnce::default(),
        }
    }
}

#[async_trait]
impl Tool for SaveVehicleTool {
    fn name(&self) -> &'static str {
        match WriteMode::for_id(self.record.id) {
            WriteMode::Insert => "insert_vehicle",
            WriteMode::Update(_) => "update_vehicle",
        }
    }

    fn description(&self) -> String {
        "Save the vehicle data the user just confirmed. Call this only if the user accepted \
         the data, and at most once. Takes no arguments."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> ToolOutput {
        if !self.once.claim() {
            return ToolOutput::error("The vehicle was already saved in this step");
        }
        match save_vehicle(ctx.backend.as_ref(), self.client_id, &self.record).await {
            Ok(stored) => {
                tracing::info!(
                    session_id = %ctx.session_id,
                    vehicle_id = %stored.id,
                    client_id = %self.client_id,
                    "Vehicle saved"
                );
                ToolOutput::success(format!("Vehicle saved with id {}", stored.id))
                    .with_data(json!(stored))
            }
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, error = %e, "Vehicle save failed");
                ToolOutput::error(format!("Saving the vehicle failed: {e}"))
            }
        }
    }

    fn is_write(&self) -> bool {
        true
    }
}

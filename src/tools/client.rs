//! Client persistence tools

use super::{Tool, ToolContext, ToolOutput, WriteMode, WriteOnce};
use crate::backend::{BackendResult, ClientPayload, IntakeBackend, StoredClient};
use crate::state_machine::ClientRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Insert the record if it has no id, else update it
pub async fn save_client(
    backend: &dyn IntakeBackend,
    record: &ClientRecord,
) -> BackendResult<StoredClient> {
    let payload = ClientPayload::try_from(record)?;
    match WriteMode::for_id(record.id) {
        WriteMode::Insert => backend.create_client(&payload).await,
        WriteMode::Update(id) => backend.update_client(id, &payload).await,
    }
}

/// Look up an existing client by document number
pub struct QueryClientTool;

#[derive(Debug, Deserialize)]
struct QueryClientInput {
    document_number: String,
}

#[async_trait]
impl Tool for QueryClientTool {
    fn name(&self) -> &'static str {
        "query_client"
    }

    fn description(&self) -> String {
        "Look up an already registered client by document number. Read-only.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["document_number"],
            "properties": {
                "document_number": {
                    "type": "string",
                    "description": "The client's document number"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: QueryClientInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        match ctx.backend.list_clients().await {
            Ok(clients) => {
                let wanted = input.document_number.trim();
                match clients
                    .into_iter()
                    .find(|c| c.documento.as_deref() == Some(wanted))
                {
                    Some(client) => ToolOutput::success(format!("Client found: {}", client.id))
                        .with_data(json!(client)),
                    None => ToolOutput::success("No client registered with that document"),
                }
            }
            Err(e) => ToolOutput::error(format!("Lookup failed: {e}")),
        }
    }
}

/// Persist the pending client record; offered as `insert_client` or
/// `update_client` depending on whether the record already has an id
pub struct SaveClientTool {
    record: ClientRecord,
    once: WriteOnce,
}

impl SaveClientTool {
    pub fn new(record: ClientRecord) -> Self {
        Self {
            record,
            once: WriteOnce::default(),
        }
    }
}

#[async_trait]
impl Tool for SaveClientTool {
    fn name(&self) -> &'static str {
        match WriteMode::for_id(self.record.id) {
            WriteMode::Insert => "insert_client",
            WriteMode::Update(_) => "update_client",
        }
    }

    fn description(&self) -> String {
        "Save the client data the user just confirmed. Call this only if the user accepted \
         the data, and at most once. Takes no arguments."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> ToolOutput {
        if !self.once.claim() {
            return ToolOutput::error("The client was already saved in this step");
        }
        match save_client(ctx.backend.as_ref(), &self.record).await {
            Ok(stored) => {
                tracing::info!(session_id = %ctx.session_id, client_id = %stored.id, "Client saved");
                ToolOutput::success(format!("Client saved with id {}", stored.id))
                    .with_data(json!(stored))
            }
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, error = %e, "Client save failed");
                ToolOutput::error(format!("Saving the client failed: {e}"))
            }
        }
    }

    fn is_write(&self) -> bool {
        true
    }
}

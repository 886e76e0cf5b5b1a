//! Persistence tools offered to the model during confirmation
//!
//! Tools are built per run. Write tools carry the pending record they will
//! persist, so the model can only decide *whether* to write, never *what*.

mod agent;
mod client;
mod vehicle;

pub use agent::{run_tool_loop, ExecutedTool, ToolRun, DEFAULT_MAX_ROUNDS};
pub use client::{save_client, QueryClientTool, SaveClientTool};
pub use vehicle::{save_vehicle, QueryVehicleTool, SaveVehicleTool};

use crate::backend::IntakeBackend;
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    /// Typed payload for the caller, e.g. the stored record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Context injected into every tool call
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub backend: Arc<dyn IntakeBackend>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, backend: Arc<dyn IntakeBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;

    /// Writes are what an accepted confirmation is detected by
    fn is_write(&self) -> bool {
        false
    }
}

/// Whether a write creates a record or replaces an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update(Uuid),
}

impl WriteMode {
    pub fn for_id(id: Option<Uuid>) -> Self {
        id.map_or(WriteMode::Insert, WriteMode::Update)
    }
}

/// Allows a bound write to happen at most once
#[derive(Debug, Default)]
pub(crate) struct WriteOnce(AtomicBool);

impl WriteOnce {
    /// `true` the first time only
    pub(crate) fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Tools available for one tool-augmented run
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn is_write(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name && t.is_write())
    }

    /// Execute a tool by name; `None` if no such tool is registered
    pub async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> Option<ToolOutput> {
        for tool in &self.tools {
            if tool.name() == name {
                return Some(tool.run(input, ctx).await);
            }
        }
        None
    }
}

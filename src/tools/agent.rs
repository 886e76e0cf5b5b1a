//! Tool-augmented model loop

use super::{ToolContext, ToolOutput, ToolRegistry};
use crate::llm::{ContentBlock, LlmError, LlmMessage, LlmRequest, LlmService, MessageRole};
use serde_json::Value;

pub const DEFAULT_MAX_ROUNDS: usize = 4;

/// A tool call the model requested and that was actually run
#[derive(Debug, Clone)]
pub struct ExecutedTool {
    pub name: String,
    pub output: ToolOutput,
    pub is_write: bool,
}

/// Final model text plus every executed tool call, in order.
///
/// `error` is set when a model request failed; `executed` still lists the
/// tools that ran before the failure.
#[derive(Debug, Clone, Default)]
pub struct ToolRun {
    pub text: String,
    pub executed: Vec<ExecutedTool>,
    pub error: Option<LlmError>,
}

impl ToolRun {
    pub fn writes(&self) -> impl Iterator<Item = &ExecutedTool> {
        self.executed.iter().filter(|t| t.is_write)
    }
}

/// Let the model call tools until it answers in text.
///
/// After `max_rounds` rounds of tool calls one last request is made with the
/// tools withdrawn, so the run always ends with an answer or an error.
pub async fn run_tool_loop(
    llm: &dyn LlmService,
    mut request: LlmRequest,
    registry: &ToolRegistry,
    ctx: &ToolContext,
    max_rounds: usize,
) -> ToolRun {
    request.tools = registry.definitions();
    let mut run = ToolRun::default();
    match drive(llm, request, registry, ctx, max_rounds, &mut run.executed).await {
        Ok(text) => run.text = text,
        Err(e) => run.error = Some(e),
    }
    run
}

async fn drive(
    llm: &dyn LlmService,
    mut request: LlmRequest,
    registry: &ToolRegistry,
    ctx: &ToolContext,
    max_rounds: usize,
    executed: &mut Vec<ExecutedTool>,
) -> Result<String, LlmError> {
    for round in 0..max_rounds {
        let response = llm.complete(&request).await?;
        let uses: Vec<(String, String, Value)> = response
            .tool_uses()
            .into_iter()
            .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
            .collect();

        if uses.is_empty() {
            return Ok(response.text());
        }

        let mut results = Vec::with_capacity(uses.len());
        for (id, name, input) in uses {
            let output = registry
                .execute(&name, input, ctx.clone())
                .await
                .unwrap_or_else(|| ToolOutput::error(format!("Unknown tool: {name}")));

            tracing::info!(
                session_id = %ctx.session_id,
                tool = %name,
                round,
                success = output.success,
                "Tool executed"
            );

            results.push(ContentBlock::tool_result(
                id,
                output.output.clone(),
                !output.success,
            ));
            executed.push(ExecutedTool {
                is_write: registry.is_write(&name),
                name,
                output,
            });
        }

        request
            .messages
            .push(LlmMessage::assistant(response.content));
        request.messages.push(LlmMessage {
            role: MessageRole::User,
            content: results,
        });
    }

    tracing::warn!(session_id = %ctx.session_id, max_rounds, "Tool rounds exhausted");
    request.tools.clear();
    let response = llm.complete(&request).await?;
    Ok(response.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IntakeBackend, MemoryBackend};
    use crate::llm::LlmResponse;
    use crate::runtime::testing::MockLlmClient;
    use crate::state_machine::ClientRecord;
    use crate::tools::{QueryClientTool, SaveClientTool};
    use serde_json::json;
    use std::sync::Arc;

    fn tool_call(id: &str, name: &str, input: Value) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::tool_use(id, name, input)],
            end_turn: false,
            usage: crate::llm::Usage::default(),
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![
            Arc::new(QueryClientTool),
            Arc::new(SaveClientTool::new(ClientRecord::default())),
        ])
    }

    fn ctx() -> ToolContext {
        ToolContext::new("s1", Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_plain_answer_runs_no_tools() {
        let llm = MockLlmClient::new("mock");
        llm.queue_response(LlmResponse::from_text("done"));

        let run = run_tool_loop(&llm, LlmRequest::new("sys"), &registry(), &ctx(), 4).await;
        assert!(run.error.is_none());
        assert_eq!(run.text, "done");
        assert!(run.executed.is_empty());
        assert_eq!(llm.recorded_requests()[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_results_fed_back() {
        let llm = MockLlmClient::new("mock");
        llm.queue_response(tool_call("c1", "query_client", json!({"document_number": "1"})));
        llm.queue_response(tool_call("c2", "made_up_tool", json!({})));
        llm.queue_response(LlmResponse::from_text("finished"));

        let run = run_tool_loop(&llm, LlmRequest::new("sys"), &registry(), &ctx(), 4).await;
        assert!(run.error.is_none());
        assert_eq!(run.text, "finished");
        assert_eq!(run.executed.len(), 2);
        assert!(run.executed[0].output.success);
        assert!(!run.executed[1].output.success);
        assert_eq!(run.writes().count(), 0);

        // third request carries both rounds: 2 messages per round
        let requests = llm.recorded_requests();
        assert_eq!(requests[2].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_rounds_are_bounded() {
        let llm = MockLlmClient::new("mock");
        for i in 0..2 {
            llm.queue_response(tool_call(&format!("c{i}"), "query_client", json!({})));
        }
        llm.queue_response(LlmResponse::from_text("giving up"));

        let run = run_tool_loop(&llm, LlmRequest::new("sys"), &registry(), &ctx(), 2).await;
        assert_eq!(run.text, "giving up");
        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].tools.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_reported() {
        let llm = MockLlmClient::new("mock");
        llm.queue_error(LlmError::network("offline"));
        let run = run_tool_loop(&llm, LlmRequest::new("sys"), &registry(), &ctx(), 4).await;
        assert!(run.error.is_some());
        assert!(run.executed.is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_write_keeps_executed_tools() {
        let backend = Arc::new(MemoryBackend::new());
        let llm = MockLlmClient::new("mock");
        llm.queue_response(tool_call("c1", "insert_client", json!({})));
        llm.queue_error(LlmError::network("connection reset"));

        let mut client = crate::runtime::testing::complete_client();
        client.id = None;
        let registry = ToolRegistry::new(vec![Arc::new(SaveClientTool::new(client))]);
        let ctx = ToolContext::new("s1", backend.clone());
        let run = run_tool_loop(&llm, LlmRequest::new("sys"), &registry, &ctx, 4).await;

        assert!(run.error.is_some());
        assert_eq!(run.writes().count(), 1);
        assert_eq!(run.executed[0].name, "insert_client");
        assert!(run.executed[0].output.success);
        assert_eq!(backend.list_clients().await.unwrap().len(), 1);
    }
}

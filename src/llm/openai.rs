//! `OpenAI`-compatible chat completions client
//!
//! Groq, Gemini and `OpenAI` all accept the same request shape on their
//! chat completions endpoints, so one client serves every provider.

use super::provider::Provider;
use super::types::{
    ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, ResponseFormat, Usage,
};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiCompatibleService {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleService {
    pub fn new(
        provider: Provider,
        api_key: String,
        model: String,
        base_url: Option<&str>,
        temperature: f32,
    ) -> Result<Self, LlmError> {
        let base = base_url.unwrap_or_else(|| provider.base_url());
        let endpoint = format!("{}/chat/completions", base.trim_end_matches('/'));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
            temperature,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(request.system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            messages.extend(translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| ChatTool {
                        r#type: "function".to_string(),
                        function: ChatFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let response_format = match request.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::JsonObject => Some(ChatResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            temperature: Some(self.temperature),
            response_format,
            stream: false,
        }
    }
}

/// One internal message may become several wire messages: tool results
/// each travel as their own "tool" role message.
fn translate_message(msg: &LlmMessage) -> Vec<ChatMessage> {
    let role = match msg.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in &msg.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ChatToolCall {
                id: id.clone(),
                r#type: "function".to_string(),
                function: ChatFunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => tool_results.push((tool_use_id.clone(), content.clone(), *is_error)),
        }
    }

    let mut messages = Vec::new();

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        messages.push(ChatMessage {
            role: role.to_string(),
            content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }

    for (tool_use_id, content, is_error) in tool_results {
        messages.push(ChatMessage {
            role: "tool".to_string(),
            content: Some(if is_error {
                format!("Error: {content}")
            } else {
                content
            }),
            tool_calls: None,
            tool_call_id: Some(tool_use_id),
        });
    }

    if messages.is_empty() {
        messages.push(ChatMessage {
            role: role.to_string(),
            content: Some(String::new()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    messages
}

fn normalize_response(resp: ChatResponse) -> Result<LlmResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("No choices in response"))?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
    }

    for tc in choice.message.tool_calls.unwrap_or_default() {
        if tc.function.name.is_empty() {
            continue;
        }
        let input = serde_json::from_str(&tc.function.arguments)
            .unwrap_or_else(|_| serde_json::json!({}));
        content.push(ContentBlock::ToolUse {
            id: tc.id,
            name: tc.function.name,
            input,
        });
    }

    let usage = resp.usage.unwrap_or_default();
    Ok(LlmResponse {
        content,
        end_turn: choice.finish_reason.as_deref() == Some("stop"),
        usage: Usage {
            input_tokens: u64::from(usage.prompt_tokens),
            output_tokens: u64::from(usage.completion_tokens),
        },
    })
}

/// Gemini wraps errors in a one-element array; the others send a bare object
fn error_message(body: &str) -> Option<String> {
    if let Ok(resp) = serde_json::from_str::<ChatErrorResponse>(body) {
        return Some(resp.error.message);
    }
    serde_json::from_str::<Vec<ChatErrorResponse>>(body)
        .ok()?
        .into_iter()
        .next()
        .map(|resp| resp.error.message)
}

fn classify_status(status: u16, message: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
        400 => LlmError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl LlmService for OpenAiCompatibleService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = error_message(&text).unwrap_or(text);
            return Err(classify_status(status.as_u16(), &message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::unknown(format!("Failed to parse response: {e} - body: {text}")))?;

        normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ChatResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    r#type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: ChatError,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;
    use serde_json::json;

    fn service() -> OpenAiCompatibleService {
        OpenAiCompatibleService::new(
            Provider::Groq,
            "test-key".to_string(),
            "llama-test".to_string(),
            None,
            0.1,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_from_provider() {
        let s = service();
        assert_eq!(s.endpoint, "https://api.groq.com/openai/v1/chat/completions");

        let s = OpenAiCompatibleService::new(
            Provider::OpenAi,
            "k".into(),
            "m".into(),
            Some("http://localhost:9999/v1/"),
            0.1,
        )
        .unwrap();
        assert_eq!(s.endpoint, "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn test_translate_request_shape() {
        let request = LlmRequest::new("be brief")
            .with_user_text("hola")
            .with_tools(vec![ToolDefinition {
                name: "query_client".into(),
                description: "look up".into(),
                input_schema: json!({"type": "object"}),
            }])
            .json_object();

        let wire = serde_json::to_value(service().translate_request(&request)).unwrap();
        assert_eq!(wire["model"], "llama-test");
        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][1]["content"], "hola");
        assert_eq!(wire["tools"][0]["function"]["name"], "query_client");
        assert_eq!(wire["response_format"]["type"], "json_object");
        assert!((wire["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_tool_results_become_tool_messages() {
        let msg = LlmMessage {
            role: MessageRole::User,
            content: vec![
                ContentBlock::tool_result("call_1", "ok", false),
                ContentBlock::tool_result("call_2", "boom", true),
            ],
        };
        let wire = translate_message(&msg);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "tool");
        assert_eq!(wire[1].content.as_deref(), Some("Error: boom"));
        assert_eq!(wire[1].tool_call_id.as_deref(), Some("call_2"));
    }

    #[test]
    fn test_normalize_tool_calls() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "insert_client", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        let normalized = normalize_response(resp).unwrap();
        assert!(!normalized.end_turn);
        let uses = normalized.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "insert_client");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(401, "x").kind, crate::llm::LlmErrorKind::Auth);
        assert_eq!(classify_status(429, "x").kind, crate::llm::LlmErrorKind::RateLimit);
        assert_eq!(classify_status(503, "x").kind, crate::llm::LlmErrorKind::ServerError);
        assert!(classify_status(502, "x").kind.is_transient());
        assert!(!classify_status(400, "x").kind.is_transient());
    }
}

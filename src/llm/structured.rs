//! Structured (JSON) model output
//!
//! Model output is untrusted text. Callers get one of three outcomes and
//! decide per step what a raw or failed answer means.

use super::{LlmError, LlmRequest, LlmService};
use serde::de::DeserializeOwned;

/// Outcome of a structured model call
#[derive(Debug)]
pub enum ModelOutput<T> {
    /// The answer parsed into the expected shape
    Structured(T),
    /// The model answered, but not in the expected shape
    Raw(String),
    /// The call itself failed
    Failed(LlmError),
}

/// Ask for a JSON object and parse it into `T`
pub async fn complete_structured<T: DeserializeOwned>(
    llm: &dyn LlmService,
    request: LlmRequest,
) -> ModelOutput<T> {
    let request = request.json_object();
    match llm.complete(&request).await {
        Ok(response) => {
            let text = response.text();
            match parse_structured(&text) {
                Some(value) => ModelOutput::Structured(value),
                None => {
                    tracing::warn!(model = %llm.model_id(), "Model answer did not match expected shape");
                    ModelOutput::Raw(text)
                }
            }
        }
        Err(e) => ModelOutput::Failed(e),
    }
}

/// Parse `T` from model text, tolerating code fences and surrounding prose
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    extract_json_object(trimmed).and_then(|candidate| serde_json::from_str(candidate).ok())
}

/// Outermost `{ ... }` span of the text
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

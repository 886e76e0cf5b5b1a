//! Provider selection and model configuration

use super::openai::OpenAiCompatibleService;
use super::{LlmError, LlmService, LoggingService};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Hosted model providers reachable through the chat completions API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
    Gemini,
    OpenAi,
}

impl Provider {
    pub fn base_url(self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Groq => "llama-3.3-70b-versatile",
            Provider::Gemini => "gemini-2.5-flash-lite",
            Provider::OpenAi => "gpt-4o-mini",
        }
    }

    /// Environment variable holding this provider's key
    pub fn key_var(self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        })
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            other => Err(LlmError::config(format!(
                "Unknown LLM_PROVIDER '{other}' (expected groq, gemini or openai)"
            ))),
        }
    }
}

/// Model configuration, usually read from the environment
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Overrides the provider's endpoint, e.g. for a local proxy
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Groq,
            api_key: None,
            model: None,
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl LlmConfig {
    /// `LLM_PROVIDER` (default groq), the provider's key variable,
    /// `LLM_MODEL` and `LLM_BASE_URL`
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let provider = match lookup("LLM_PROVIDER") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Provider::Groq,
        };
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            provider,
            api_key: non_empty(provider.key_var()),
            model: non_empty("LLM_MODEL"),
            base_url: non_empty("LLM_BASE_URL"),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Build the logged model service; fails when the key is missing
    pub fn build(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            LlmError::config(format!(
                "{} must be set when LLM_PROVIDER={}",
                self.provider.key_var(),
                self.provider
            ))
        })?;

        let service = OpenAiCompatibleService::new(
            self.provider,
            api_key,
            self.model_name().to_string(),
            self.base_url.as_deref(),
            self.temperature,
        )?;

        Ok(Arc::new(LoggingService::new(Arc::new(service))))
    }
}

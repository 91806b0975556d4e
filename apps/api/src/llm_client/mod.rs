//! Reasoning-backend abstraction.
//!
//! ARCHITECTURAL RULE: no other module may call a provider API directly.
//! Two concrete providers (Anthropic, an OpenAI-compatible endpoint) sit
//! behind one `ReasoningBackend` trait; `chain::FallbackChain` owns retry,
//! timeout, and failover policy, so the providers themselves stay single-shot.

pub mod anthropic;
pub mod chain;
pub mod openai_compat;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Provider failure taxonomy. Only rate limits are worth retrying against the
/// same provider; everything else fails over immediately.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited (status {status})")]
    RateLimited { status: u16 },

    #[error("backend returned empty content")]
    Empty,

    #[error("malformed backend output: {0}")]
    Malformed(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no reasoning backend available")]
    NoBackend,
}

impl BackendError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, BackendError::RateLimited { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation handed to a backend. Action results are fed
/// back as user messages so both wire formats stay simple.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// JSON-schema description of an action the model may call.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A structured action call extracted from a backend response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    pub args: Value,
}

/// What a backend produced: free text, action calls, or both.
#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub text: Option<String>,
    pub actions: Vec<ActionCall>,
}

impl BackendResponse {
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}

#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Full reasoning call: system prompt, conversation, available actions.
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        actions: &[ActionSchema],
    ) -> Result<BackendResponse, BackendError>;

    /// Plain-text generation with no actions offered.
    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError>;
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Parses backend text into `T`, tolerating code fences. A parse failure is a
/// `Malformed` error, never a panic.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    let cleaned = strip_json_fences(text);
    serde_json::from_str(cleaned).map_err(|e| BackendError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_json_tolerates_fences() {
        #[derive(Deserialize)]
        struct Out {
            score: f64,
        }
        let out: Out = parse_json("```json\n{\"score\": 0.7}\n```").unwrap();
        assert!((out.score - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_json_reports_malformed() {
        let err = parse_json::<Value>("not json at all").unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[test]
    fn test_only_rate_limits_are_retryable() {
        assert!(BackendError::RateLimited { status: 429 }.is_rate_limit());
        assert!(!BackendError::Api {
            status: 500,
            message: "boom".to_string()
        }
        .is_rate_limit());
        assert!(!BackendError::Timeout(Duration::from_secs(30)).is_rate_limit());
    }
}

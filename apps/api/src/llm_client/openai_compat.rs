//! OpenAI-compatible chat-completions backend (secondary provider).
//!
//! Pointed at a Groq-style endpoint by default; anything that speaks the
//! chat-completions wire format with `tools` support works.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    ActionCall, ActionSchema, BackendError, BackendResponse, ChatMessage, ReasoningBackend,
};

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f64 = 0.3;

#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// Arguments arrive as a JSON-encoded string, not an object.
    arguments: String,
}

#[derive(Clone)]
pub struct OpenAiCompatBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatBackend {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    async fn call(
        &self,
        system: &str,
        messages: &[ChatMessage],
        actions: &[ActionSchema],
    ) -> Result<BackendResponse, BackendError> {
        let mut wire_messages = vec![json!({"role": "system", "content": system})];
        for m in messages {
            wire_messages.push(json!({"role": m.role.as_str(), "content": m.content}));
        }

        let tools = if actions.is_empty() {
            None
        } else {
            Some(
                actions
                    .iter()
                    .map(|a| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": a.name,
                                "description": a.description,
                                "parameters": a.parameters,
                            }
                        })
                    })
                    .collect(),
            )
        };

        let request_body = CompletionsRequest {
            model: &self.model,
            messages: wire_messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            tools,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(BackendError::RateLimited { status });
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, message });
        }

        let parsed: CompletionsResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(BackendError::Empty)?;

        debug!("chat-completions call succeeded (model: {})", self.model);

        let mut calls = Vec::new();
        if let Some(tool_calls) = choice.message.tool_calls {
            for call in tool_calls {
                let args: Value = serde_json::from_str(&call.function.arguments)
                    .map_err(|e| BackendError::Malformed(format!("tool arguments: {e}")))?;
                calls.push(ActionCall {
                    name: call.function.name,
                    args,
                });
            }
        }

        Ok(BackendResponse {
            text: choice.message.content.filter(|c| !c.trim().is_empty()),
            actions: calls,
        })
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        actions: &[ActionSchema],
    ) -> Result<BackendResponse, BackendError> {
        self.call(system, messages, actions).await
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, BackendError> {
        let messages = [ChatMessage::user(user)];
        let response = self.call(system, &messages, &[]).await?;
        response.text.ok_or(BackendError::Empty)
    }
}

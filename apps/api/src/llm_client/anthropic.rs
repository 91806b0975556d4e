//! Anthropic Messages API backend (primary provider).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ActionCall, ActionSchema, BackendError, BackendResponse, ChatMessage, ReasoningBackend,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Single-shot Anthropic client. Retry and failover live in the fallback
/// chain, not here.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    async fn call(
        &self,
        system: &str,
        messages: &[ChatMessage],
        actions: &[ActionSchema],
    ) -> Result<BackendResponse, BackendError> {
        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        let tools = if actions.is_empty() {
            None
        } else {
            Some(
                actions
                    .iter()
                    .map(|a| WireTool {
                        name: &a.name,
                        description: &a.description,
                        input_schema: &a.parameters,
                    })
                    .collect(),
            )
        };

        let request_body = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: wire_messages,
            tools,
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status().as_u16();

        // 529 is Anthropic's overloaded signal; treated like a rate limit.
        if status == 429 || status == 529 {
            return Err(BackendError::RateLimited { status });
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BackendError::Api { status, message });
        }

        let parsed: MessagesResponse = response.json().await?;

        debug!(
            "Anthropic call succeeded: input_tokens={}, output_tokens={}",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );

        let mut text_parts: Vec<String> = Vec::new();
        let mut calls: Vec<ActionCall> = Vec::new();
        for block in parsed.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(t) = block.text {
                        text_parts.push(t);
                    }
                }
                "tool_use" => {
                    if let Some(name) = block.name {
                        calls.push(ActionCall {
                            name,
                            args: block.input.unwrap_or(Value::Null),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(BackendResponse {
            text: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            actions: calls,
        })
    }
}

#[async_trait]
impl ReasoningBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_tools_when_none_offered() {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: "be brief",
            messages: vec![WireMessage {
                role: "user",
                content: "hello",
            }],
            tools: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn response_splits_text_and_tool_use_blocks() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Thinking it over."},
                {"type": "tool_use", "name": "analyze_answer", "input": {"answer": "x"}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let parsed: MessagesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert_eq!(parsed.content[1].block_type, "tool_use");
        assert_eq!(parsed.content[1].name.as_deref(), Some("analyze_answer"));
    }
}

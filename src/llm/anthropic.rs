//! Anthropic Messages API reasoner
//!
//! Translates the run's conversation into Messages API format. The system entry
//! becomes `system`, tool turns become `tool_result` blocks in a user message, and
//! consecutive turns with the same API role are merged into one message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::reasoner::{Reasoner, ReasonerError};
use super::types::{PlanRequest, PlanResponse, TokenUsage};
use crate::domain::{ConversationEntry, DEFAULT_MODEL, Role, ToolCall};

/// Anthropic API endpoint
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 8192;

const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuration for the Anthropic reasoner
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Used when a request does not name a model
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub api_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(300),
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }
}

/// Reasoner backed by the Anthropic Messages API
pub struct AnthropicReasoner {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
}

impl AnthropicReasoner {
    /// Create a reasoner reading the API key from `ANTHROPIC_API_KEY`
    pub fn new(config: AnthropicConfig) -> Result<Self, ReasonerError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| ReasonerError::MissingApiKey {
            env_var: API_KEY_ENV.to_string(),
        })?;
        Self::with_api_key(api_key, config)
    }

    pub fn with_api_key(api_key: impl Into<String>, config: AnthropicConfig) -> Result<Self, ReasonerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, request: &PlanRequest) -> Value {
        let model = if request.model.is_empty() {
            self.config.model.as_str()
        } else {
            request.model.as_str()
        };

        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut messages: Vec<(&'static str, Vec<Value>)> = Vec::new();
        for entry in request.messages.iter().filter(|m| m.role != Role::System) {
            let (role, blocks) = entry_blocks(entry);
            if blocks.is_empty() {
                continue;
            }
            match messages.last_mut() {
                Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
                _ => messages.push((role, blocks)),
            }
        }

        let messages: Vec<Value> = messages
            .into_iter()
            .map(|(role, content)| json!({ "role": role, "content": content }))
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": self.config.max_tokens,
            "messages": messages
        });

        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_anthropic_schema()).collect();
            body["tools"] = json!(tools);
        }

        body
    }

    fn parse_response(&self, body: Value) -> Result<PlanResponse, ReasonerError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| ReasonerError::InvalidResponse("missing content array".to_string()))?;

        let usage = body
            .get("usage")
            .map(|u| {
                TokenUsage::new(
                    u["input_tokens"].as_u64().unwrap_or(0),
                    u["output_tokens"].as_u64().unwrap_or(0),
                )
            })
            .unwrap_or_default();

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str() {
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or("");
                    let name = block["name"].as_str().unwrap_or("");
                    tool_calls.push(ToolCall::new(id, name, block["input"].clone()));
                }
                _ => {}
            }
        }

        Ok(PlanResponse {
            content,
            tool_calls,
            usage,
        })
    }

    async fn send_request(&self, body: Value) -> Result<Value, ReasonerError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ReasonerError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReasonerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ReasonerError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

/// API role and content blocks for one conversation entry
fn entry_blocks(entry: &ConversationEntry) -> (&'static str, Vec<Value>) {
    match entry.role {
        Role::Tool => (
            "user",
            vec![json!({
                "type": "tool_result",
                "tool_use_id": entry.tool_call_id.clone().unwrap_or_default(),
                "content": entry.content,
                "is_error": entry.is_error
            })],
        ),
        Role::Assistant => {
            let mut blocks = Vec::new();
            if !entry.content.trim().is_empty() {
                blocks.push(json!({ "type": "text", "text": entry.content }));
            }
            for call in &entry.tool_calls {
                let input = if call.args.is_object() { call.args.clone() } else { json!({}) };
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": input
                }));
            }
            ("assistant", blocks)
        }
        Role::User | Role::System => {
            let blocks = if entry.content.trim().is_empty() {
                Vec::new()
            } else {
                vec![json!({ "type": "text", "text": entry.content })]
            };
            ("user", blocks)
        }
    }
}

#[async_trait]
impl Reasoner for AnthropicReasoner {
    async fn plan(&self, request: PlanRequest) -> Result<PlanResponse, ReasonerError> {
        let body = self.build_request(&request);
        log::debug!("anthropic request: model={} messages={}", body["model"], request.messages.len());
        let response = self.send_request(body).await?;
        self.parse_response(response)
    }
}

impl std::fmt::Debug for AnthropicReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicReasoner")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolResult;
    use crate::llm::ToolDefinition;

    fn reasoner() -> AnthropicReasoner {
        AnthropicReasoner::with_api_key("test-key", AnthropicConfig::default()).unwrap()
    }

    fn request(messages: Vec<ConversationEntry>) -> PlanRequest {
        PlanRequest {
            model: String::new(),
            messages,
            tools: Vec::new(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.api_url, ANTHROPIC_API_URL);
    }

    #[test]
    fn test_build_request_basic() {
        let body = reasoner().build_request(&request(vec![
            ConversationEntry::system("You are helpful"),
            ConversationEntry::user("Hello"),
        ]));

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["text"], "Hello");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_uses_request_model_and_tools() {
        let mut req = request(vec![ConversationEntry::system("s"), ConversationEntry::user("go")]);
        req.model = "claude-opus-4-5-20250514".to_string();
        req.tools = vec![ToolDefinition::new("read_file", "Read a file", json!({"type": "object"}))];

        let body = reasoner().build_request(&req);
        assert_eq!(body["model"], "claude-opus-4-5-20250514");
        assert_eq!(body["tools"][0]["name"], "read_file");
    }

    #[test]
    fn test_build_request_tool_round_trip_and_merging() {
        let call_a = ToolCall::new("toolu_a", "read_file", json!({"path": "a.txt"}));
        let call_b = ToolCall::new("toolu_b", "read_file", json!({"path": "b.txt"}));
        let result_a = ToolResult::success(&call_a, "A");
        let result_b = ToolResult::failure(&call_b, "missing");

        let body = reasoner().build_request(&request(vec![
            ConversationEntry::system("s"),
            ConversationEntry::user("go"),
            ConversationEntry::assistant("reading", vec![call_a, call_b]),
            ConversationEntry::tool(&result_a, "A"),
            ConversationEntry::tool(&result_b, "missing"),
            ConversationEntry::user("[Iteration 1/3] Goal NOT YET achieved."),
        ]));

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["id"], "toolu_a");
        assert_eq!(messages[1]["content"][2]["input"]["path"], "b.txt");

        let last = &messages[2];
        assert_eq!(last["role"], "user");
        assert_eq!(last["content"][0]["type"], "tool_result");
        assert_eq!(last["content"][0]["tool_use_id"], "toolu_a");
        assert_eq!(last["content"][1]["is_error"], true);
        assert_eq!(last["content"][2]["type"], "text");
    }

    #[test]
    fn test_build_request_skips_empty_assistant_text() {
        let body = reasoner().build_request(&request(vec![
            ConversationEntry::system("s"),
            ConversationEntry::user("go"),
            ConversationEntry::assistant("", vec![]),
            ConversationEntry::user("status"),
        ]));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let response = reasoner()
            .parse_response(json!({
                "content": [
                    { "type": "text", "text": "Let me read that file" },
                    { "type": "tool_use", "id": "toolu_123", "name": "read_file", "input": { "path": "x.txt" } }
                ],
                "stop_reason": "tool_use",
                "usage": { "input_tokens": 50, "output_tokens": 30 }
            }))
            .unwrap();

        assert_eq!(response.content, "Let me read that file");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "toolu_123");
        assert_eq!(response.tool_calls[0].args["path"], "x.txt");
        assert_eq!(response.usage, TokenUsage::new(50, 30));
    }

    #[test]
    fn test_parse_response_text_only_without_usage() {
        let response = reasoner()
            .parse_response(json!({ "content": [{ "type": "text", "text": "done" }] }))
            .unwrap();
        assert_eq!(response.content, "done");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.usage.total(), 0);
    }

    #[test]
    fn test_parse_response_missing_content() {
        let result = reasoner().parse_response(json!({ "type": "error" }));
        assert!(matches!(result, Err(ReasonerError::InvalidResponse(_))));
    }
}

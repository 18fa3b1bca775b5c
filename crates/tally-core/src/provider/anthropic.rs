//! Anthropic Messages API provider
//!
//! Translates the unified request/response shapes to the Anthropic
//! Messages wire format (`/v1/messages`): content blocks, `tool_use` /
//! `tool_result` framing, base64 image source blocks, and the
//! server-side `web_search` tool.
//!
//! # Configuration
//!
//! Environment variables:
//! - `ANTHROPIC_API_KEY`: API key (required)
//! - `ANTHROPIC_HOST`: Base URL override (default: `https://api.anthropic.com`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::types::{
    ChatMessage, ChatRequest, ChatResponse, ContentBlock, ProviderError, TokenUsage,
};
use super::ChatProvider;

const DEFAULT_HOST: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Maximum provider-side web searches per request
const WEB_SEARCH_MAX_USES: u32 = 5;

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<serde_json::Value>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
    server_tool_use: Option<WireServerToolUse>,
}

#[derive(Debug, Deserialize)]
struct WireServerToolUse {
    web_search_requests: Option<u32>,
}

/// Anthropic Messages API provider
#[derive(Clone)]
pub struct AnthropicProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(api_key: &str) -> Self {
        Self::with_host(DEFAULT_HOST, api_key)
    }

    /// Create with a custom base URL (compat servers, tests)
    pub fn with_host(base_url: &str, api_key: &str) -> Self {
        Self::with_timeout(base_url, api_key, Duration::from_secs(120))
    }

    /// Create with an explicit hard timeout per call
    ///
    /// The timeout is applied to each request rather than baked into the
    /// client, so no client construction path can drop it.
    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        let host = std::env::var("ANTHROPIC_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        Some(Self::with_host(&host, &api_key))
    }

    /// Get the base URL
    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn to_wire_message(message: &ChatMessage) -> WireMessage {
        let content = message.content.iter().map(Self::to_wire_block).collect();
        WireMessage {
            role: message.role.clone(),
            content,
        }
    }

    fn to_wire_block(block: &ContentBlock) -> serde_json::Value {
        match block {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::Image { media_type, data } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                }
            }),
            ContentBlock::ToolUse { id, name, input } => json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut value = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                });
                if let Some(true) = is_error {
                    value["is_error"] = json!(true);
                }
                value
            }
            // Search results only come back from the provider; echoing the
            // citation as plain text keeps history valid on the next round.
            ContentBlock::WebSearchResult { title, url } => {
                json!({"type": "text", "text": format!("{} ({})", title, url)})
            }
        }
    }

    fn from_wire_blocks(blocks: &[serde_json::Value]) -> Vec<ContentBlock> {
        let mut out = Vec::new();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        out.push(ContentBlock::text(text));
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    out.push(ContentBlock::ToolUse {
                        id: id.to_string(),
                        name: name.to_string(),
                        input,
                    });
                }
                Some("web_search_tool_result") => {
                    // Nested list of result entries with title + url
                    if let Some(entries) = block.get("content").and_then(|c| c.as_array()) {
                        for entry in entries {
                            let title = entry.get("title").and_then(|v| v.as_str());
                            let url = entry.get("url").and_then(|v| v.as_str());
                            if let (Some(title), Some(url)) = (title, url) {
                                out.push(ContentBlock::WebSearchResult {
                                    title: title.to_string(),
                                    url: url.to_string(),
                                });
                            }
                        }
                    }
                }
                // server_tool_use and anything unrecognized carries nothing
                // the loop acts on
                _ => {}
            }
        }
        out
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        if request.web_search {
            tools.push(json!({
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": WEB_SEARCH_MAX_USES,
            }));
        }

        let wire = WireRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            messages: request.messages.iter().map(Self::to_wire_message).collect(),
            system: request.system.clone(),
            tools,
            temperature: request.temperature,
        };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            web_search = request.web_search,
            "Sending Anthropic messages request"
        );

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&wire)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let wire_response: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let usage = wire_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                web_search_requests: u.server_tool_use.and_then(|s| s.web_search_requests),
            })
            .unwrap_or_default();

        debug!(
            stop_reason = ?wire_response.stop_reason,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received Anthropic messages response"
        );

        Ok(ChatResponse {
            content: Self::from_wire_blocks(&wire_response.content),
            usage,
            model_used: wire_response.model,
            stop_reason: wire_response.stop_reason,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

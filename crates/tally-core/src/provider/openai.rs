//! OpenAI-compatible chat completions provider
//!
//! Works with any server implementing the OpenAI `/v1/chat/completions`
//! API, including the hosted service, vLLM, LocalAI, and llama-server.
//! Tool calls map between the unified `tool_use`/`tool_result` blocks
//! and OpenAI's `tool_calls` / `role:"tool"` framing; image blocks
//! become data-URL parts.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_HOST`: Server URL (default: `https://api.openai.com`)
//! - `OPENAI_API_KEY`: API key if the server requires one (optional)

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

const DEFAULT_HOST: &str = "https://api.openai.com";

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    model: String,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireAssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAssistantMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// OpenAI-compatible chat completions provider
#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a new provider against a host
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self::with_timeout(base_url, api_key, Duration::from_secs(120))
    }

    /// Create with an explicit hard timeout per call
    ///
    /// The timeout is applied to each request rather than baked into the
    /// client, so no client construction path can drop it.
    pub fn with_timeout(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            http_client: Client::default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            timeout,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        // Hosted endpoint is useless without a key; compat servers are not.
        if host == DEFAULT_HOST && api_key.is_none() {
            return None;
        }
        Some(Self::new(&host, api_key.as_deref()))
    }

    /// Get the base URL
    pub fn host(&self) -> &str {
        &self.base_url
    }

    /// Flatten one unified message into OpenAI wire messages.
    ///
    /// Tool results cannot live inside a user message on this API; each
    /// becomes its own `role:"tool"` message, in block order, so ID
    /// correlation survives the translation.
    fn to_wire_messages(message: &ChatMessage) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        let mut parts: Vec<serde_json::Value> = Vec::new();
        let mut tool_calls: Vec<serde_json::Value> = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => {
                    parts.push(json!({"type": "text", "text": text}));
                }
                ContentBlock::Image { media_type, data } => {
                    parts.push(json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:{};base64,{}", media_type, data)},
                    }));
                }
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": input.to_string(),
                        },
                    }));
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    }));
                }
                ContentBlock::WebSearchResult { title, url } => {
                    parts.push(json!({
                        "type": "text",
                        "text": format!("{} ({})", title, url),
                    }));
                }
            }
        }

        if !parts.is_empty() || !tool_calls.is_empty() {
            let mut msg = json!({"role": message.role});
            if !parts.is_empty() {
                msg["content"] = json!(parts);
            }
            if !tool_calls.is_empty() {
                msg["tool_calls"] = json!(tool_calls);
                if parts.is_empty() {
                    msg["content"] = serde_json::Value::Null;
                }
            }
            // Tool messages for this batch must follow the assistant
            // message that requested them, never precede it.
            out.insert(0, msg);
        }

        out
    }

    fn from_wire_message(message: WireAssistantMessage) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();

        if let Some(text) = message.content {
            if !text.is_empty() {
                blocks.push(ContentBlock::text(text));
            }
        }

        for call in message.tool_calls.unwrap_or_default() {
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Object(Default::default()));
            blocks.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        blocks
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            messages.extend(Self::to_wire_messages(message));
        }

        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    },
                })
            })
            .collect();

        if request.web_search {
            // No server-side search on this API; the model simply answers
            // without citations.
            debug!("web_search requested but not supported by OpenAI-compatible provider");
        }

        let wire = WireRequest {
            model: request.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completions request"
        );

        let mut builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&wire);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
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
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                web_search_requests: None,
            })
            .unwrap_or_default();

        let choice = wire_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))?;

        let stop_reason = choice.finish_reason.map(|r| match r.as_str() {
            "stop" => "end_turn".to_string(),
            "tool_calls" => "tool_use".to_string(),
            "length" => "max_tokens".to_string(),
            _ => r,
        });

        Ok(ChatResponse {
            content: Self::from_wire_message(choice.message),
            usage,
            model_used: wire_response.model,
            stop_reason,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

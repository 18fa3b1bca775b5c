//! Unified request/response shapes shared by all chat-completion providers

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message in a conversation, provider-agnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "user", "assistant"
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create an assistant message with text content
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create a user message from arbitrary blocks (images, tool results)
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".into(),
            content: blocks,
        }
    }

    /// Create an assistant message with content blocks
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".into(),
            content: blocks,
        }
    }
}

/// Content block types, the unified tagged union
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    /// Base64-encoded image payload
    #[serde(rename = "image")]
    Image { media_type: String, data: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// A citation produced by a provider-side web search
    #[serde(rename = "web_search_result")]
    WebSearchResult { title: String, url: String },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image block from raw bytes
    pub fn image(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        use base64::Engine;
        Self::Image {
            media_type: media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Create a tool result block
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: None,
        }
    }

    /// Create an error tool result block
    pub fn tool_error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: error.into(),
            is_error: Some(true),
        }
    }
}

/// Tool declaration sent to providers
///
/// Provider-agnostic; each backend converts this to its wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value, // JSON Schema
}

impl Tool {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Unified chat-completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
    /// Ask the provider to enable its server-side web search tool,
    /// where supported.
    pub web_search: bool,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages,
            tools: Vec::new(),
            web_search: false,
            max_tokens: 4096,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Number of provider-side web searches, if the response reports any
    pub web_search_requests: Option<u32>,
}

/// Unified chat-completion response
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub usage: TokenUsage,
    /// The model that actually answered (relevant after fallback)
    pub model_used: String,
    pub stop_reason: Option<String>, // "end_turn", "tool_use", "max_tokens"
}

impl ChatResponse {
    /// Extract all tool use blocks in received order
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// Extract text content from the response
    pub fn text(&self) -> Option<String> {
        let texts: Vec<_> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }

    /// Extract web search result blocks
    pub fn web_search_results(&self) -> Vec<(&str, &str)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::WebSearchResult { title, url } => {
                    Some((title.as_str(), url.as_str()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Provider failure, classified so the fallback cascade can decide
/// whether a backup attempt is worthwhile.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Server-side / transient failures are worth one backup attempt;
    /// 4xx, validation, and parse failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            // 529 is the Anthropic overload code; it is >= 500 anyway.
            Self::Api { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }

    /// Map a reqwest failure, keeping timeout distinct from other
    /// network errors.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = ChatMessage::user("Hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content.len(), 1);

        let assistant = ChatMessage::assistant("Hi");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_tool_result_blocks() {
        let ok = ContentBlock::tool_result("tool-1", "done");
        match ok {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "tool-1");
                assert!(is_error.is_none());
            }
            _ => panic!("Expected ToolResult"),
        }

        let err = ContentBlock::tool_error("tool-2", "boom");
        match err {
            ContentBlock::ToolResult { is_error, .. } => assert_eq!(is_error, Some(true)),
            _ => panic!("Expected ToolResult"),
        }
    }

    #[test]
    fn test_image_block_encodes_base64() {
        let block = ContentBlock::image("image/jpeg", b"abc");
        match block {
            ContentBlock::Image { media_type, data } => {
                assert_eq!(media_type, "image/jpeg");
                assert_eq!(data, "YWJj");
            }
            _ => panic!("Expected Image"),
        }
    }

    #[test]
    fn test_response_tool_uses_order() {
        let response = ChatResponse {
            content: vec![
                ContentBlock::text("Let me record those"),
                ContentBlock::ToolUse {
                    id: "a".into(),
                    name: "track_expense".into(),
                    input: serde_json::json!({"amount": 5.0}),
                },
                ContentBlock::ToolUse {
                    id: "b".into(),
                    name: "track_expense".into(),
                    input: serde_json::json!({"amount": 10.0}),
                },
            ],
            usage: TokenUsage::default(),
            model_used: "test-model".into(),
            stop_reason: Some("tool_use".into()),
        };

        let uses = response.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].0, "a");
        assert_eq!(uses[1].0, "b");
    }

    #[test]
    fn test_response_text_joins_blocks() {
        let response = ChatResponse {
            content: vec![ContentBlock::text("Hello"), ContentBlock::text("World")],
            usage: TokenUsage::default(),
            model_used: "test-model".into(),
            stop_reason: Some("end_turn".into()),
        };
        assert_eq!(response.text().unwrap(), "Hello\nWorld");
    }

    #[test]
    fn test_error_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Api {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(ProviderError::Api {
            status: 529,
            body: "overloaded".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 400,
            body: "bad request".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 429,
            body: "rate limited".into()
        }
        .is_transient());
        assert!(!ProviderError::InvalidResponse("garbage".into()).is_transient());
    }

    #[test]
    fn test_content_block_serialization_tags() {
        let json = serde_json::to_value(ContentBlock::text("hi")).unwrap();
        assert_eq!(json["type"], "text");

        let json = serde_json::to_value(ContentBlock::WebSearchResult {
            title: "Docs".into(),
            url: "https://example.com".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "web_search_result");
    }
}

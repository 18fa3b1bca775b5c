//! Pluggable chat-completion provider abstraction
//!
//! This module normalizes requests/responses across chat-completion
//! backends into one shape the tool-calling loop can drive.
//!
//! # Architecture
//!
//! - `ChatProvider` trait: one `call` per round, unified request in,
//!   unified response out
//! - `ChatClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch
//! - Backend implementations: `AnthropicProvider`, `OpenAiProvider`,
//!   `MockProvider`
//! - `FallbackCascade`: primary→backup retry policy on top of the trait
//!
//! # Configuration
//!
//! Environment variables:
//! - `CHAT_PROVIDER`: Backend to use (anthropic, openai, mock).
//!   Default: anthropic
//! - `ANTHROPIC_API_KEY` / `ANTHROPIC_HOST`: Anthropic backend
//! - `OPENAI_API_KEY` / `OPENAI_HOST`: OpenAI-compatible backend

mod anthropic;
pub mod fallback;
mod mock;
mod openai;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use fallback::{FallbackCascade, ModelTarget};
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ContentBlock, ProviderError, TokenUsage, Tool,
};

use async_trait::async_trait;

/// Trait implemented by every chat-completion backend
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Issue one chat-completion call
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Short backend name for logs and error reports
    fn name(&self) -> &str;
}

/// Concrete provider enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ChatClient {
    /// Anthropic Messages API
    Anthropic(AnthropicProvider),
    /// OpenAI-compatible chat completions (hosted, vLLM, LocalAI, etc.)
    OpenAi(OpenAiProvider),
    /// Mock provider for testing
    Mock(MockProvider),
}

impl ChatClient {
    /// Create a chat client from environment variables
    ///
    /// Checks `CHAT_PROVIDER` to determine which backend to use:
    /// - `anthropic` (default): Uses ANTHROPIC_API_KEY / ANTHROPIC_HOST
    /// - `openai`: Uses OPENAI_API_KEY / OPENAI_HOST
    /// - `mock`: Creates a mock provider for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("CHAT_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());

        match backend.to_lowercase().as_str() {
            "anthropic" => AnthropicProvider::from_env().map(ChatClient::Anthropic),
            "openai" | "openai_compatible" | "vllm" | "localai" => {
                OpenAiProvider::from_env().map(ChatClient::OpenAi)
            }
            "mock" => Some(ChatClient::Mock(MockProvider::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown CHAT_PROVIDER, falling back to anthropic");
                AnthropicProvider::from_env().map(ChatClient::Anthropic)
            }
        }
    }

    /// Create a mock client for testing
    pub fn mock() -> Self {
        ChatClient::Mock(MockProvider::new())
    }
}

#[async_trait]
impl ChatProvider for ChatClient {
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self {
            ChatClient::Anthropic(p) => p.call(request).await,
            ChatClient::OpenAi(p) => p.call(request).await,
            ChatClient::Mock(p) => p.call(request).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ChatClient::Anthropic(p) => p.name(),
            ChatClient::OpenAi(p) => p.name(),
            ChatClient::Mock(p) => p.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_client_name() {
        let client = ChatClient::mock();
        assert_eq!(client.name(), "mock");
    }

    #[tokio::test]
    async fn test_client_delegates_to_mock() {
        let mock = MockProvider::new();
        mock.push_text("hello");
        let client = ChatClient::Mock(mock);

        let request = ChatRequest::new("mock-model", vec![ChatMessage::user("hi")]);
        let response = client.call(&request).await.unwrap();
        assert_eq!(response.text().unwrap(), "hello");
    }
}

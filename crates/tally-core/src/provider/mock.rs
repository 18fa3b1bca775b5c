//! Mock provider for testing
//!
//! Replays a scripted queue of responses/failures and records every
//! request it receives, so tests can drive the tool loop and the
//! fallback cascade without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::types::{ChatRequest, ChatResponse, ContentBlock, ProviderError, TokenUsage};
use super::ChatProvider;

/// One scripted reply
#[derive(Debug)]
pub enum Scripted {
    Reply(ChatResponse),
    Fail(ProviderError),
}

/// Mock chat provider with a scripted reply queue
///
/// Clones share the same script and request log.
#[derive(Clone, Default)]
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    /// Create an empty mock (calls fail until replies are pushed)
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full response
    pub fn push_response(&self, response: ChatResponse) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(Scripted::Reply(response));
    }

    /// Queue a plain-text final answer
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(ChatResponse {
            content: vec![ContentBlock::text(text)],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                web_search_requests: None,
            },
            model_used: "mock-model".into(),
            stop_reason: Some("end_turn".into()),
        });
    }

    /// Queue a response requesting the given tool invocations
    pub fn push_tool_round(&self, uses: Vec<(&str, &str, serde_json::Value)>) {
        let content = uses
            .into_iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            })
            .collect();
        self.push_response(ChatResponse {
            content,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                web_search_requests: None,
            },
            model_used: "mock-model".into(),
            stop_reason: Some("tool_use".into()),
        });
    }

    /// Queue a failure
    pub fn push_failure(&self, error: ProviderError) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(Scripted::Fail(error));
    }

    /// Queue a transient server failure (HTTP 500)
    pub fn push_server_error(&self) {
        self.push_failure(ProviderError::Api {
            status: 500,
            body: "internal error".into(),
        });
    }

    /// Queue a timeout failure
    pub fn push_timeout(&self) {
        self.push_failure(ProviderError::Timeout(Duration::from_secs(30)));
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock request lock").clone()
    }

    /// Number of calls made against this mock
    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("mock request lock").len()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests
            .lock()
            .expect("mock request lock")
            .push(request.clone());

        match self.script.lock().expect("mock script lock").pop_front() {
            Some(Scripted::Reply(mut response)) => {
                // Attribute the reply to the requested model so usage
                // records in tests match the calling configuration.
                response.model_used = request.model.clone();
                Ok(response)
            }
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(ProviderError::InvalidResponse(
                "mock script exhausted".into(),
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let mock = MockProvider::new();
        mock.push_text("first");
        mock.push_text("second");

        let request = ChatRequest::new("mock-model", vec![ChatMessage::user("hi")]);
        let a = mock.call(&request).await.unwrap();
        let b = mock.call(&request).await.unwrap();
        assert_eq!(a.text().unwrap(), "first");
        assert_eq!(b.text().unwrap(), "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_exhausted_script_fails() {
        let mock = MockProvider::new();
        let request = ChatRequest::new("mock-model", vec![ChatMessage::user("hi")]);
        let err = mock.call(&request).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockProvider::new();
        mock.push_text("ok");

        let request = ChatRequest::new("backup-model", vec![ChatMessage::user("question")]);
        let response = mock.call(&request).await.unwrap();
        assert_eq!(response.model_used, "backup-model");
        assert_eq!(mock.requests()[0].model, "backup-model");
    }
}

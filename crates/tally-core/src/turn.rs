//! Conversation turn loop
//!
//! Runs one user turn to completion: send the thread history to the
//! provider cascade, execute any tool calls it asks for, feed the
//! results back, and repeat until the model answers in plain text.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  1. Persist and append the user message                    │
//! │  2. Call the fallback cascade with history + tools         │
//! │  3. tool_use blocks present?                               │
//! │     yes: dispatch each, batch results into one user        │
//! │          message, go to 2                                  │
//! │     no:  assemble the final reply                          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tool failures never abort a round; they come back to the model as
//! `is_error` tool results. Only a cascade failure or the round cap
//! fails the whole turn.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::context::ContextAssembler;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{AssistantType, Role, Thread, Transaction, UsageKind};
use crate::prompts::system_prompt;
use crate::provider::{ChatMessage, ChatRequest, ChatResponse, ContentBlock, FallbackCascade};
use crate::tools::{self, finance_tools};

/// Guard against a model invoking tools forever
pub const MAX_ROUNDS: usize = 8;

/// Citations included when web search produced results
const MAX_CITATIONS: usize = 3;

/// One piece of an incoming user message
#[derive(Debug, Clone)]
pub enum UserPart {
    Text(String),
    Image { media_type: String, data: Vec<u8> },
}

impl UserPart {
    fn into_block(self) -> ContentBlock {
        match self {
            UserPart::Text(text) => ContentBlock::text(text),
            UserPart::Image { media_type, data } => ContentBlock::image(media_type, &data),
        }
    }
}

/// Runs turns against one thread
pub struct TurnRunner<'a> {
    db: &'a Database,
    cascade: &'a FallbackCascade,
}

impl<'a> TurnRunner<'a> {
    pub fn new(db: &'a Database, cascade: &'a FallbackCascade) -> Self {
        Self { db, cascade }
    }

    /// Run one user turn to completion and return the reply text
    pub async fn run(&self, thread: &Thread, parts: Vec<UserPart>) -> Result<String> {
        let user_blocks: Vec<ContentBlock> =
            parts.into_iter().map(UserPart::into_block).collect();
        self.db
            .append_message(thread.id, Role::User, &user_blocks)?;

        let system = self.build_system_prompt(thread)?;
        let tool_set = match thread.assistant_type {
            AssistantType::Finance => finance_tools(),
            AssistantType::Normal => Vec::new(),
        };

        let mut messages: Vec<ChatMessage> = self
            .db
            .thread_messages(thread.id)?
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect();

        // Expenses recorded this turn, for the summary block.
        let mut recorded: Vec<Transaction> = Vec::new();
        // Search citations collected across rounds, deduplicated by URL.
        let mut citations: Vec<(String, String)> = Vec::new();

        info!(
            thread_id = thread.id,
            assistant_type = %thread.assistant_type,
            history_len = messages.len(),
            "Starting turn"
        );

        for round in 0..MAX_ROUNDS {
            let request = ChatRequest::new(self.cascade.primary_model(), messages.clone())
                .with_system(system.clone())
                .with_tools(tool_set.clone())
                .with_web_search(thread.web_search_enabled);

            let response = self.cascade.call(&request).await?;
            self.record_usage(thread, &response)?;
            collect_citations(&mut citations, &response);

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            self.db
                .append_message(thread.id, Role::Assistant, &response.content)?;
            messages.push(ChatMessage::assistant_blocks(response.content.clone()));

            if tool_uses.is_empty() {
                info!(thread_id = thread.id, round, "Turn complete");
                let narrative = response.text().unwrap_or_default();
                return Ok(assemble_reply(&narrative, &recorded, &citations));
            }

            debug!(
                thread_id = thread.id,
                round,
                tool_count = tool_uses.len(),
                "Dispatching tool calls"
            );

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                match tools::dispatch(self.db, thread.user_id, &name, input) {
                    Ok(outcome) => {
                        debug!(tool = %name, "Tool succeeded");
                        results.push(ContentBlock::tool_result(id, outcome.text));
                        if let Some(expense) = outcome.recorded_expense {
                            recorded.push(expense);
                        }
                    }
                    Err(e) => {
                        warn!(tool = %name, error = %e, "Tool failed");
                        results.push(ContentBlock::tool_error(id, e.to_string()));
                    }
                }
            }

            // All results for this round go back as one user message.
            self.db.append_message(thread.id, Role::User, &results)?;
            messages.push(ChatMessage::user_blocks(results));
        }

        warn!(thread_id = thread.id, rounds = MAX_ROUNDS, "Round cap hit");
        Err(Error::LoopExceeded { rounds: MAX_ROUNDS })
    }

    fn build_system_prompt(&self, thread: &Thread) -> Result<String> {
        let today = chrono::Utc::now().date_naive();
        match thread.assistant_type {
            AssistantType::Finance => {
                let ctx = ContextAssembler::new(self.db).for_user(thread.user_id)?;
                Ok(system_prompt(AssistantType::Finance, today, Some(&ctx)))
            }
            AssistantType::Normal => Ok(system_prompt(AssistantType::Normal, today, None)),
        }
    }

    /// One completion record per response, plus a web-search record
    /// when the provider reports searches.
    fn record_usage(&self, thread: &Thread, response: &ChatResponse) -> Result<()> {
        let usage = &response.usage;
        self.db.record_usage(
            thread.user_id,
            Some(thread.id),
            UsageKind::Completion,
            i64::from(usage.input_tokens) + i64::from(usage.output_tokens),
            Some(usage.input_tokens.into()),
            Some(usage.output_tokens.into()),
            Some(&response.model_used),
        )?;

        if let Some(searches) = usage.web_search_requests {
            if searches > 0 {
                self.db.record_usage(
                    thread.user_id,
                    Some(thread.id),
                    UsageKind::WebSearch,
                    searches as i64,
                    None,
                    None,
                    Some(&response.model_used),
                )?;
            }
        }
        Ok(())
    }
}

fn collect_citations(citations: &mut Vec<(String, String)>, response: &ChatResponse) {
    for (title, url) in response.web_search_results() {
        if citations.iter().any(|(_, u)| u == url) {
            continue;
        }
        citations.push((title.to_string(), url.to_string()));
    }
}

/// Final reply assembly: citations, then the multi-expense summary,
/// then the model's narrative. Markup is limited to bold and links.
fn assemble_reply(
    narrative: &str,
    recorded: &[Transaction],
    citations: &[(String, String)],
) -> String {
    let mut sections = Vec::new();

    if !citations.is_empty() {
        let mut lines = vec!["<b>Sources:</b>".to_string()];
        for (title, url) in citations.iter().take(MAX_CITATIONS) {
            lines.push(format!("<a href=\"{}\">{}</a>", url, title));
        }
        sections.push(lines.join("\n"));
    }

    if recorded.len() > 1 {
        sections.push(expense_summary(recorded));
    }

    if !narrative.is_empty() {
        sections.push(narrative.to_string());
    }

    sections.join("\n\n")
}

fn expense_summary(recorded: &[Transaction]) -> String {
    let mut lines = vec![format!("<b>Recorded {} expenses:</b>", recorded.len())];
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for t in recorded {
        lines.push(format!(
            "- #{} {:.2} {} {}",
            t.id, t.amount, t.currency, t.description
        ));
        *totals.entry(t.currency.as_str()).or_insert(0.0) += t.amount;
    }
    for (currency, total) in totals {
        lines.push(format!("Total: {:.2} {}", total, currency));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::models::{AccountType, NewAccount};
    use crate::provider::{ChatClient, MockProvider, ModelTarget, TokenUsage};
    use crate::reporter::CapturingReporter;

    fn setup() -> (Database, MockProvider, FallbackCascade) {
        let db = Database::in_memory().unwrap();
        db.create_account(&NewAccount {
            user_id: 1,
            name: "Wallet".to_string(),
            currency: "USD".to_string(),
            account_type: AccountType::Cash,
            balance: 100.0,
            is_default: true,
        })
        .unwrap();

        let mock = MockProvider::new();
        let cascade = FallbackCascade::new(
            ModelTarget::new(ChatClient::Mock(mock.clone()), "mock-model"),
            Arc::new(CapturingReporter::new()),
        );
        (db, mock, cascade)
    }

    fn finance_thread(db: &Database) -> Thread {
        db.create_thread(1, AssistantType::Finance, false).unwrap()
    }

    #[tokio::test]
    async fn test_plain_reply_passes_through() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);
        mock.push_text("Hello!");

        let reply = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("hi".to_string())])
            .await
            .unwrap();

        assert_eq!(reply, "Hello!");
        assert_eq!(mock.call_count(), 1);

        // User message and assistant reply both persisted.
        let stored = db.thread_messages(thread.id).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_round_batches_results_in_one_message() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);

        mock.push_tool_round(vec![
            (
                "tu_1",
                "track_expense",
                json!({"amount": 12.5, "currency": "USD", "description": "coffee"}),
            ),
            (
                "tu_2",
                "track_expense",
                json!({"amount": 30.0, "currency": "USD", "description": "dinner"}),
            ),
        ]);
        mock.push_text("Got both recorded.");

        let reply = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("coffee and dinner".to_string())])
            .await
            .unwrap();

        // Second request carries both tool results as one user message.
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let followup = requests[1].messages.last().unwrap();
        assert_eq!(followup.role, "user");
        let result_ids: Vec<_> = followup
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, vec!["tu_1", "tu_2"]);

        // Two expenses in one turn get a summary block.
        assert!(reply.contains("Recorded 2 expenses"));
        assert!(reply.contains("Total: 42.50 USD"));
        assert!(reply.contains("Got both recorded."));

        assert_eq!(db.recent_transactions(1, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_single_expense_gets_no_summary() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);

        mock.push_tool_round(vec![(
            "tu_1",
            "track_expense",
            json!({"amount": 12.5, "currency": "USD", "description": "coffee"}),
        )]);
        mock.push_text("Recorded your coffee.");

        let reply = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("coffee".to_string())])
            .await
            .unwrap();

        assert_eq!(reply, "Recorded your coffee.");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);

        mock.push_tool_round(vec![("tu_1", "teleport_money", json!({}))]);
        mock.push_text("Sorry, that went wrong.");

        let reply = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("do magic".to_string())])
            .await
            .unwrap();
        assert_eq!(reply, "Sorry, that went wrong.");

        let requests = mock.requests();
        let followup = requests[1].messages.last().unwrap();
        match &followup.content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                content,
            } => {
                assert_eq!(tool_use_id, "tu_1");
                assert_eq!(*is_error, Some(true));
                assert!(content.contains("unknown tool"));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_cap_is_loop_exceeded() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);

        for i in 0..MAX_ROUNDS {
            let id = format!("tu_{}", i);
            mock.push_tool_round(vec![(id.as_str(), "list_transactions", json!({}))]);
        }

        let err = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("loop forever".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LoopExceeded { rounds } if rounds == MAX_ROUNDS));
    }

    #[tokio::test]
    async fn test_usage_recorded_per_response() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);

        mock.push_tool_round(vec![("tu_1", "list_transactions", json!({}))]);
        mock.push_text("Nothing recorded yet.");

        TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("what did I spend?".to_string())])
            .await
            .unwrap();

        let events = db.usage_events(1).unwrap();
        assert_eq!(events.len(), 2);
        for event in &events {
            assert_eq!(event.kind, UsageKind::Completion);
            assert_eq!(event.model.as_deref(), Some("mock-model"));
            assert_eq!(event.thread_id, Some(thread.id));
        }
    }

    #[tokio::test]
    async fn test_web_search_usage_and_citations() {
        let (db, mock, cascade) = setup();
        let thread = db.create_thread(1, AssistantType::Normal, true).unwrap();

        mock.push_response(ChatResponse {
            content: vec![
                ContentBlock::WebSearchResult {
                    title: "Example".to_string(),
                    url: "https://example.com".to_string(),
                },
                ContentBlock::text("Found it online."),
            ],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                web_search_requests: Some(2),
            },
            model_used: "mock-model".to_string(),
            stop_reason: Some("end_turn".to_string()),
        });

        let reply = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("look this up".to_string())])
            .await
            .unwrap();

        assert!(reply.contains("<a href=\"https://example.com\">Example</a>"));
        assert!(reply.contains("Found it online."));

        let events = db.usage_events(1).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, UsageKind::WebSearch);
        assert_eq!(events[1].amount, 2);
    }

    #[tokio::test]
    async fn test_cascade_failure_fails_turn() {
        let (db, mock, cascade) = setup();
        let thread = finance_thread(&db);
        mock.push_server_error();

        let err = TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("hi".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn test_normal_thread_sends_no_tools() {
        let (db, mock, cascade) = setup();
        let thread = db.create_thread(1, AssistantType::Normal, false).unwrap();
        mock.push_text("Hello.");

        TurnRunner::new(&db, &cascade)
            .run(&thread, vec![UserPart::Text("hi".to_string())])
            .await
            .unwrap();

        let requests = mock.requests();
        assert!(requests[0].tools.is_empty());
        assert!(!requests[0].system.as_ref().unwrap().contains("track_expense"));
    }
}

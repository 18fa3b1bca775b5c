//! Tally Core Library
//!
//! Shared functionality for the Tally conversational finance assistant:
//! - Encrypted SQLite ledger (accounts, transactions, budgets, threads)
//! - Provider-agnostic chat completion with primary/backup fallback
//! - Tool-calling turn loop with a finance tool registry
//! - Day-by-day budget allocation with rollover
//! - Media-group aggregation and per-thread turn serialization

pub mod aggregator;
pub mod budget;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod prompts;
pub mod provider;
pub mod reporter;
pub mod service;
pub mod tools;
pub mod turn;

pub use aggregator::TurnAggregator;
pub use context::{ContextAssembler, FinanceContext};
pub use db::Database;
pub use error::{Error, Result};
pub use provider::{
    AnthropicProvider, ChatClient, ChatMessage, ChatProvider, ChatRequest, ChatResponse,
    ContentBlock, FallbackCascade, MockProvider, ModelTarget, OpenAiProvider, ProviderError, Tool,
};
pub use reporter::{ErrorReporter, LogReporter};
pub use service::{AssistantService, ThreadOptions, FAILED_TURN_REPLY};
pub use tools::{DispatchError, ToolName, ToolOutcome};
pub use turn::{TurnRunner, UserPart};

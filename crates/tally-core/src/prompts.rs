//! System prompt assembly
//!
//! Prompt bodies live as markdown under `prompts/` and are compiled in.
//! The finance prompt gets the ledger snapshot appended so the model
//! sees current balances and budgets without a tool round.

use chrono::NaiveDate;

use crate::context::FinanceContext;
use crate::models::AssistantType;

mod defaults {
    pub const NORMAL: &str = include_str!("../../../prompts/normal_assistant.md");
    pub const FINANCE: &str = include_str!("../../../prompts/finance_assistant.md");
}

/// Build the system prompt for one turn
pub fn system_prompt(
    assistant_type: AssistantType,
    today: NaiveDate,
    context: Option<&FinanceContext>,
) -> String {
    let base = match assistant_type {
        AssistantType::Normal => defaults::NORMAL,
        AssistantType::Finance => defaults::FINANCE,
    };

    let mut prompt = format!("{}\n\nToday's date: {}", base.trim_end(), today);

    if assistant_type == AssistantType::Finance {
        match context {
            Some(ctx) if !ctx.is_empty() => {
                prompt.push_str("\n\n");
                prompt.push_str(&ctx.render());
            }
            _ => prompt.push_str("\n\nThe ledger is empty; no accounts exist yet."),
        }
    }

    prompt
}

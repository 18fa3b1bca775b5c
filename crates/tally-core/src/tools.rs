//! Finance tool implementations
//!
//! These tools are the model-facing write and query surface over the
//! ledger. The orchestrator dispatches `tool_use` blocks here and feeds
//! the returned text back as `tool_result` blocks.
//!
//! Validation problems (bad dates, missing records, malformed params)
//! come back as ordinary result text so the model can correct itself in
//! the next round. Only unknown tool names and storage failures surface
//! as error results.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::db::Database;
use crate::error::Error;
use crate::models::{
    AccountType, NewAccount, NewBudget, NewTransaction, Transaction, TransactionType,
};
use crate::provider::Tool;

/// Tool dispatch failure
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    StoreUnavailable(#[source] Error),
}

impl From<Error> for DispatchError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidData(msg) => DispatchError::Validation(msg),
            Error::NotFound(msg) => DispatchError::Validation(msg),
            other => DispatchError::StoreUnavailable(other),
        }
    }
}

type ToolResult<T> = std::result::Result<T, DispatchError>;

/// Every tool the finance assistant can call
///
/// Wire names are parsed into this enum before dispatch, so a
/// hallucinated tool name is rejected in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    TrackExpense,
    TrackIncome,
    EditTransaction,
    DeleteTransaction,
    CreateBudget,
    DeleteBudget,
    CreateAccount,
    ListTransactions,
    GetBudgetStatus,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrackExpense => "track_expense",
            Self::TrackIncome => "track_income",
            Self::EditTransaction => "edit_transaction",
            Self::DeleteTransaction => "delete_transaction",
            Self::CreateBudget => "create_budget",
            Self::DeleteBudget => "delete_budget",
            Self::CreateAccount => "create_account",
            Self::ListTransactions => "list_transactions",
            Self::GetBudgetStatus => "get_budget_status",
        }
    }

    pub fn parse(name: &str) -> ToolResult<Self> {
        match name {
            "track_expense" => Ok(Self::TrackExpense),
            "track_income" => Ok(Self::TrackIncome),
            "edit_transaction" => Ok(Self::EditTransaction),
            "delete_transaction" => Ok(Self::DeleteTransaction),
            "create_budget" => Ok(Self::CreateBudget),
            "delete_budget" => Ok(Self::DeleteBudget),
            "create_account" => Ok(Self::CreateAccount),
            "list_transactions" => Ok(Self::ListTransactions),
            "get_budget_status" => Ok(Self::GetBudgetStatus),
            other => Err(DispatchError::UnknownTool(other.to_string())),
        }
    }
}

/// What a tool call produced
///
/// `recorded_expense` is set only by `track_expense` so the turn loop
/// can build a spending summary when several expenses land in one turn.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub text: String,
    pub recorded_expense: Option<Transaction>,
}

impl ToolOutcome {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            recorded_expense: None,
        }
    }
}

// =============================================================================
// Date parsing
// =============================================================================

/// Parse a user-facing date, `DD.MM.YYYY`
pub fn parse_user_date(s: &str) -> ToolResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%d.%m.%Y").map_err(|_| {
        DispatchError::Validation(format!("Invalid date: {}. Use DD.MM.YYYY", s))
    })
}

/// Parse a budget boundary date, `YYYY-MM-DD` or `DD.MM.YYYY`
pub fn parse_flexible_date(s: &str) -> ToolResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .map_err(|_| {
            DispatchError::Validation(format!(
                "Invalid date: {}. Use YYYY-MM-DD or DD.MM.YYYY",
                s
            ))
        })
}

fn parse_date_or_today(s: Option<&str>) -> ToolResult<NaiveDate> {
    match s {
        Some(date_str) => parse_user_date(date_str),
        None => Ok(Utc::now().date_naive()),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(input: Value) -> ToolResult<T> {
    serde_json::from_value(input)
        .map_err(|e| DispatchError::Validation(format!("Invalid parameters: {}", e)))
}

fn validate_amount(amount: f64) -> ToolResult<f64> {
    if !amount.is_finite() || amount == 0.0 {
        return Err(DispatchError::Validation(
            "Amount must be a non-zero number".to_string(),
        ));
    }
    Ok(amount.abs())
}

fn normalize_currency(currency: &str) -> ToolResult<String> {
    let trimmed = currency.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::Validation(
            "Currency must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_uppercase())
}

// =============================================================================
// track_expense / track_income
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TrackExpenseParams {
    /// Expense amount; sign is ignored, magnitude is stored
    #[schemars(description = "Amount spent (positive number)")]
    pub amount: f64,

    #[schemars(description = "Currency code, e.g. USD or EUR")]
    pub currency: String,

    #[schemars(description = "What the money was spent on")]
    pub description: String,

    /// Defaults to today (UTC) when omitted
    #[schemars(description = "Date of the expense in DD.MM.YYYY format. Omit for today")]
    pub date: Option<String>,

    #[schemars(description = "Account ID to charge. Omit to use the default account")]
    pub account_id: Option<i64>,
}

pub fn track_expense(
    db: &Database,
    user_id: i64,
    params: TrackExpenseParams,
) -> ToolResult<ToolOutcome> {
    let recorded = record_transaction(
        db,
        user_id,
        TransactionType::Expense,
        params.amount,
        &params.currency,
        &params.description,
        params.date.as_deref(),
        params.account_id,
    )?;

    let text = format!(
        "Recorded expense #{}: {:.2} {} for \"{}\" on {}",
        recorded.id, recorded.amount, recorded.currency, recorded.description, recorded.date
    );
    Ok(ToolOutcome {
        text,
        recorded_expense: Some(recorded),
    })
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TrackIncomeParams {
    #[schemars(description = "Amount received (positive number)")]
    pub amount: f64,

    #[schemars(description = "Currency code, e.g. USD or EUR")]
    pub currency: String,

    #[schemars(description = "Source of the income")]
    pub description: String,

    #[schemars(description = "Date of the income in DD.MM.YYYY format. Omit for today")]
    pub date: Option<String>,

    #[schemars(description = "Account ID to credit. Omit to use the default account")]
    pub account_id: Option<i64>,
}

pub fn track_income(
    db: &Database,
    user_id: i64,
    params: TrackIncomeParams,
) -> ToolResult<ToolOutcome> {
    let recorded = record_transaction(
        db,
        user_id,
        TransactionType::Income,
        params.amount,
        &params.currency,
        &params.description,
        params.date.as_deref(),
        params.account_id,
    )?;

    Ok(ToolOutcome::text(format!(
        "Recorded income #{}: {:.2} {} from \"{}\" on {}",
        recorded.id, recorded.amount, recorded.currency, recorded.description, recorded.date
    )))
}

#[allow(clippy::too_many_arguments)]
fn record_transaction(
    db: &Database,
    user_id: i64,
    tx_type: TransactionType,
    amount: f64,
    currency: &str,
    description: &str,
    date: Option<&str>,
    account_id: Option<i64>,
) -> ToolResult<Transaction> {
    let amount = validate_amount(amount)?;
    let currency = normalize_currency(currency)?;
    let date = parse_date_or_today(date)?;

    if description.trim().is_empty() {
        return Err(DispatchError::Validation(
            "Description must not be empty".to_string(),
        ));
    }

    let account = match account_id {
        Some(id) => db.find_account(user_id, id)?.ok_or_else(|| {
            DispatchError::Validation(format!("No account with id {}", id))
        })?,
        None => db.default_account(user_id)?.ok_or_else(|| {
            DispatchError::Validation(
                "No accounts yet. Create one with create_account first".to_string(),
            )
        })?,
    };

    let recorded = db.create_transaction(&NewTransaction {
        user_id,
        account_id: account.id,
        tx_type,
        amount,
        currency,
        date,
        description: description.trim().to_string(),
    })?;

    let delta = balance_delta(tx_type, recorded.amount);
    if delta != 0.0 {
        db.adjust_account_balance(user_id, account.id, delta)?;
    }

    Ok(recorded)
}

/// Signed effect of a transaction on its account balance
fn balance_delta(tx_type: TransactionType, amount: f64) -> f64 {
    match tx_type {
        TransactionType::Expense => -amount,
        TransactionType::Income => amount,
        TransactionType::Transfer => 0.0,
    }
}

// =============================================================================
// edit_transaction / delete_transaction
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EditTransactionParams {
    #[schemars(description = "ID of the transaction to edit")]
    pub transaction_id: i64,

    #[schemars(description = "New amount (positive number)")]
    pub amount: Option<f64>,

    #[schemars(description = "New description")]
    pub description: Option<String>,

    #[schemars(description = "New date in DD.MM.YYYY format")]
    pub date: Option<String>,
}

pub fn edit_transaction(
    db: &Database,
    user_id: i64,
    params: EditTransactionParams,
) -> ToolResult<ToolOutcome> {
    if params.amount.is_none() && params.description.is_none() && params.date.is_none() {
        return Err(DispatchError::Validation(
            "Nothing to change. Provide amount, description, or date".to_string(),
        ));
    }

    let Some(existing) = db.find_transaction(user_id, params.transaction_id)? else {
        return Err(DispatchError::Validation(format!(
            "No transaction with id {}",
            params.transaction_id
        )));
    };

    let amount = params.amount.map(validate_amount).transpose()?;
    let date = params.date.as_deref().map(parse_user_date).transpose()?;

    let patch = crate::db::TransactionPatch {
        amount,
        description: params.description,
        date,
    };
    let Some(updated) = db.update_transaction(user_id, params.transaction_id, &patch)? else {
        return Err(DispatchError::Validation(format!(
            "No transaction with id {}",
            params.transaction_id
        )));
    };

    // An amount change moves the account balance by the difference.
    if let Some(new_amount) = amount {
        let delta =
            balance_delta(existing.tx_type, new_amount) - balance_delta(existing.tx_type, existing.amount);
        if delta != 0.0 {
            db.adjust_account_balance(user_id, existing.account_id, delta)?;
        }
    }

    Ok(ToolOutcome::text(format!(
        "Updated transaction #{}: {:.2} {} for \"{}\" on {}",
        updated.id, updated.amount, updated.currency, updated.description, updated.date
    )))
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteTransactionParams {
    #[schemars(description = "ID of the transaction to delete")]
    pub transaction_id: i64,
}

pub fn delete_transaction(
    db: &Database,
    user_id: i64,
    params: DeleteTransactionParams,
) -> ToolResult<ToolOutcome> {
    let Some(deleted) = db.delete_transaction(user_id, params.transaction_id)? else {
        return Err(DispatchError::Validation(format!(
            "No transaction with id {}",
            params.transaction_id
        )));
    };

    // Undo the balance effect of the removed record.
    let delta = -balance_delta(deleted.tx_type, deleted.amount);
    if delta != 0.0 {
        db.adjust_account_balance(user_id, deleted.account_id, delta)?;
    }

    Ok(ToolOutcome::text(format!(
        "Deleted transaction #{}: {:.2} {} for \"{}\"",
        deleted.id, deleted.amount, deleted.currency, deleted.description
    )))
}

// =============================================================================
// create_budget / delete_budget / get_budget_status
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateBudgetParams {
    #[schemars(description = "Total amount to budget for the period (positive number)")]
    pub total_amount: f64,

    #[schemars(description = "Currency code, e.g. USD. One budget per currency")]
    pub currency: String,

    #[schemars(description = "First day of the budget, YYYY-MM-DD or DD.MM.YYYY")]
    pub start_date: String,

    #[schemars(description = "Last day of the budget, YYYY-MM-DD or DD.MM.YYYY")]
    pub end_date: String,
}

pub fn create_budget(
    db: &Database,
    user_id: i64,
    params: CreateBudgetParams,
) -> ToolResult<ToolOutcome> {
    let total_amount = validate_amount(params.total_amount)?;
    let currency = normalize_currency(&params.currency)?;
    let start_date = parse_flexible_date(&params.start_date)?;
    let end_date = parse_flexible_date(&params.end_date)?;

    if end_date <= start_date {
        return Err(DispatchError::Validation(
            "End date must be after start date".to_string(),
        ));
    }

    let budget = db.create_budget(&NewBudget {
        user_id,
        total_amount,
        currency,
        start_date,
        end_date,
    })?;

    let days = crate::budget::period_days(&budget);
    Ok(ToolOutcome::text(format!(
        "Created budget #{}: {:.2} {} from {} to {} ({} days, {:.2}/day)",
        budget.id,
        budget.total_amount,
        budget.currency,
        budget.start_date,
        budget.end_date,
        days,
        budget.total_amount / days as f64
    )))
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteBudgetParams {
    #[schemars(description = "ID of the budget to delete")]
    pub budget_id: i64,
}

pub fn delete_budget(
    db: &Database,
    user_id: i64,
    params: DeleteBudgetParams,
) -> ToolResult<ToolOutcome> {
    let Some(deleted) = db.delete_budget(user_id, params.budget_id)? else {
        return Err(DispatchError::Validation(format!(
            "No budget with id {}",
            params.budget_id
        )));
    };

    Ok(ToolOutcome::text(format!(
        "Deleted budget #{}: {:.2} {} ({} to {})",
        deleted.id, deleted.total_amount, deleted.currency, deleted.start_date, deleted.end_date
    )))
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct BudgetStatusParams {
    #[schemars(description = "Currency of the budget to check. Omit if there is only one budget")]
    pub currency: Option<String>,
}

pub fn get_budget_status(
    db: &Database,
    user_id: i64,
    params: BudgetStatusParams,
) -> ToolResult<ToolOutcome> {
    let budget = match params.currency.as_deref() {
        Some(currency) => {
            let currency = normalize_currency(currency)?;
            db.find_budget_by_currency(user_id, &currency)?
                .ok_or_else(|| {
                    DispatchError::Validation(format!("No budget in {}", currency))
                })?
        }
        None => {
            let mut budgets = db.list_budgets(user_id)?;
            match budgets.len() {
                0 => {
                    return Err(DispatchError::Validation(
                        "No budgets yet. Create one with create_budget".to_string(),
                    ))
                }
                1 => budgets.remove(0),
                _ => {
                    return Err(DispatchError::Validation(
                        "Several budgets exist. Specify the currency".to_string(),
                    ))
                }
            }
        }
    };

    let today = Utc::now().date_naive();
    if today < budget.start_date || today > budget.end_date {
        return Ok(ToolOutcome::text(format!(
            "Budget #{} ({:.2} {}) runs {} to {}; today is outside that period",
            budget.id, budget.total_amount, budget.currency, budget.start_date, budget.end_date
        )));
    }

    let expenses =
        db.expenses_in_period(user_id, &budget.currency, budget.start_date, today)?;
    let allocation = crate::budget::daily_allocation(today, &budget, &expenses);
    let spent_today = crate::budget::spent_on(today, &budget.currency, &expenses);
    let remaining = (allocation - spent_today).max(0.0);

    Ok(ToolOutcome::text(format!(
        "Budget #{}: {:.2} {} from {} to {}. Today's allocation: {:.2}, spent today: {:.2}, remaining today: {:.2}",
        budget.id,
        budget.total_amount,
        budget.currency,
        budget.start_date,
        budget.end_date,
        allocation,
        spent_today,
        remaining
    )))
}

// =============================================================================
// create_account / list_transactions
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateAccountParams {
    #[schemars(description = "Account name, e.g. 'Wallet' or 'Main bank'")]
    pub name: String,

    #[schemars(description = "Account type: bank, cash, or crypto")]
    pub account_type: String,

    #[schemars(description = "Currency code, e.g. USD")]
    pub currency: String,

    #[schemars(description = "Opening balance. Defaults to 0")]
    pub balance: Option<f64>,

    #[schemars(description = "Make this the default account for new transactions")]
    pub is_default: Option<bool>,
}

pub fn create_account(
    db: &Database,
    user_id: i64,
    params: CreateAccountParams,
) -> ToolResult<ToolOutcome> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(DispatchError::Validation(
            "Account name must not be empty".to_string(),
        ));
    }
    let account_type: AccountType = params
        .account_type
        .parse()
        .map_err(|_| {
            DispatchError::Validation(format!(
                "Unknown account type: {}. Use bank, cash, or crypto",
                params.account_type
            ))
        })?;
    let currency = normalize_currency(&params.currency)?;

    let account = db.create_account(&NewAccount {
        user_id,
        name: name.to_string(),
        currency,
        account_type,
        balance: params.balance.unwrap_or(0.0),
        is_default: params.is_default.unwrap_or(false),
    })?;

    let default_note = if account.is_default { " (default)" } else { "" };
    Ok(ToolOutcome::text(format!(
        "Created {} account #{} \"{}\" with balance {:.2} {}{}",
        account.account_type, account.id, account.name, account.balance, account.currency, default_note
    )))
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListTransactionsParams {
    #[schemars(description = "How many recent transactions to return (default 10, max 50)")]
    pub limit: Option<i64>,
}

pub fn list_transactions(
    db: &Database,
    user_id: i64,
    params: ListTransactionsParams,
) -> ToolResult<ToolOutcome> {
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let transactions = db.recent_transactions(user_id, limit)?;

    if transactions.is_empty() {
        return Ok(ToolOutcome::text("No transactions yet"));
    }

    let mut lines = Vec::with_capacity(transactions.len());
    for t in &transactions {
        lines.push(format!(
            "#{} {} {} {:.2} {} — {}",
            t.id, t.date, t.tx_type, t.amount, t.currency, t.description
        ));
    }
    Ok(ToolOutcome::text(lines.join("\n")))
}

// =============================================================================
// Dispatch
// =============================================================================

/// Run one tool call against the ledger
///
/// Validation failures are folded into `Ok` text so the model sees them
/// as a normal tool result and can retry with corrected arguments.
pub fn dispatch(
    db: &Database,
    user_id: i64,
    name: &str,
    input: Value,
) -> ToolResult<ToolOutcome> {
    let tool = ToolName::parse(name)?;
    let outcome = match tool {
        ToolName::TrackExpense => track_expense(db, user_id, parse_params(input)?),
        ToolName::TrackIncome => track_income(db, user_id, parse_params(input)?),
        ToolName::EditTransaction => edit_transaction(db, user_id, parse_params(input)?),
        ToolName::DeleteTransaction => delete_transaction(db, user_id, parse_params(input)?),
        ToolName::CreateBudget => create_budget(db, user_id, parse_params(input)?),
        ToolName::DeleteBudget => delete_budget(db, user_id, parse_params(input)?),
        ToolName::CreateAccount => create_account(db, user_id, parse_params(input)?),
        ToolName::ListTransactions => list_transactions(db, user_id, parse_params(input)?),
        ToolName::GetBudgetStatus => get_budget_status(db, user_id, parse_params(input)?),
    };

    match outcome {
        Err(DispatchError::Validation(msg)) => Ok(ToolOutcome::text(format!("Error: {}", msg))),
        other => other,
    }
}

// =============================================================================
// Tool definitions
// =============================================================================

/// All finance tools in the provider-agnostic format
pub fn finance_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "track_expense",
            "Record an expense. Amount, currency, and description are required; \
             date defaults to today.",
            schemars::schema_for!(TrackExpenseParams).into(),
        ),
        Tool::new(
            "track_income",
            "Record income received into an account.",
            schemars::schema_for!(TrackIncomeParams).into(),
        ),
        Tool::new(
            "edit_transaction",
            "Change the amount, description, or date of an existing transaction by its ID.",
            schemars::schema_for!(EditTransactionParams).into(),
        ),
        Tool::new(
            "delete_transaction",
            "Delete a transaction by its ID and restore the account balance.",
            schemars::schema_for!(DeleteTransactionParams).into(),
        ),
        Tool::new(
            "create_budget",
            "Create a spending budget: a total amount spread over a date range. \
             One budget per currency.",
            schemars::schema_for!(CreateBudgetParams).into(),
        ),
        Tool::new(
            "delete_budget",
            "Delete a budget by its ID.",
            schemars::schema_for!(DeleteBudgetParams).into(),
        ),
        Tool::new(
            "create_account",
            "Create a bank, cash, or crypto account. The first account becomes the default.",
            schemars::schema_for!(CreateAccountParams).into(),
        ),
        Tool::new(
            "list_transactions",
            "List the most recent transactions.",
            schemars::schema_for!(ListTransactionsParams).into(),
        ),
        Tool::new(
            "get_budget_status",
            "Get today's spending allowance for a budget, including rollover from earlier days.",
            schemars::schema_for!(BudgetStatusParams).into(),
        ),
    ]
}

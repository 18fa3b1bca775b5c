//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A ledger account (bank, cash, or crypto)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Sequential business ID, unique per deployment
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub currency: String,
    pub account_type: AccountType,
    pub balance: f64,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Bank,
    Cash,
    Crypto,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Cash => "cash",
            Self::Crypto => "crypto",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bank" => Ok(Self::Bank),
            "cash" => Ok(Self::Cash),
            "crypto" => Ok(Self::Crypto),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data for creating a new account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: i64,
    pub name: String,
    pub currency: String,
    pub account_type: AccountType,
    pub balance: f64,
    pub is_default: bool,
}

/// A ledger transaction
///
/// `amount` is always a non-negative magnitude; the sign semantics come
/// from `tx_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Sequential business ID, unique per deployment
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub tx_type: TransactionType,
    pub amount: f64,
    pub currency: String,
    pub date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data for creating a new transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub account_id: i64,
    pub tx_type: TransactionType,
    pub amount: f64,
    pub currency: String,
    pub date: NaiveDate,
    pub description: String,
}

/// A spending budget over a date period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Sequential business ID, unique per deployment
    pub id: i64,
    pub user_id: i64,
    pub total_amount: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new budget
#[derive(Debug, Clone)]
pub struct NewBudget {
    pub user_id: i64,
    pub total_amount: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Which assistant persona (and tool set) a thread uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssistantType {
    #[default]
    Normal,
    Finance,
}

impl AssistantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Finance => "finance",
        }
    }
}

impl std::str::FromStr for AssistantType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "finance" => Ok(Self::Finance),
            _ => Err(format!("Unknown assistant type: {}", s)),
        }
    }
}

impl std::fmt::Display for AssistantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ongoing assistant session grouping stored messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub user_id: i64,
    pub assistant_type: AssistantType,
    pub web_search_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message persisted in a thread
///
/// Content is the unified block list; a conversation turn is
/// reconstructed from stored messages ordered by creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub thread_id: i64,
    pub role: Role,
    pub content: Vec<crate::provider::ContentBlock>,
    pub created_at: DateTime<Utc>,
}

/// Record types that carry sequential business IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Account,
    Transaction,
    Budget,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Transaction => "transaction",
            Self::Budget => "budget",
        }
    }
}

/// Usage event kinds for the telemetry sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Prompt,
    Completion,
    WebSearch,
    /// Reserved for the invite/referral layer outside this core
    ReferralBonus,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Completion => "completion",
            Self::WebSearch => "web_search",
            Self::ReferralBonus => "referral_bonus",
        }
    }
}

impl std::str::FromStr for UsageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prompt" => Ok(Self::Prompt),
            "completion" => Ok(Self::Completion),
            "web_search" => Ok(Self::WebSearch),
            "referral_bonus" => Ok(Self::ReferralBonus),
            _ => Err(format!("Unknown usage kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_account_type_round_trip() {
        for t in [AccountType::Bank, AccountType::Cash, AccountType::Crypto] {
            assert_eq!(AccountType::from_str(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn test_transaction_type_round_trip() {
        for t in [
            TransactionType::Income,
            TransactionType::Expense,
            TransactionType::Transfer,
        ] {
            assert_eq!(TransactionType::from_str(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn test_assistant_type_unknown() {
        assert!(AssistantType::from_str("imaginary").is_err());
    }

    #[test]
    fn test_usage_kind_round_trip() {
        for k in [
            UsageKind::Prompt,
            UsageKind::Completion,
            UsageKind::WebSearch,
            UsageKind::ReferralBonus,
        ] {
            assert_eq!(UsageKind::from_str(k.as_str()).unwrap(), k);
        }
    }
}

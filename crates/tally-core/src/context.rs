//! Finance context assembler
//!
//! Gathers what the model needs to see before a finance turn: the
//! user's accounts, recent transactions, and active budget status.
//! The assembled context renders to a text block that is appended to
//! the system prompt.

use chrono::Utc;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Account, Budget, Transaction};

/// Recent transactions included in the prompt
const RECENT_TRANSACTION_LIMIT: i64 = 15;

/// Assembled ledger snapshot for prompt rendering
#[derive(Debug, Default)]
pub struct FinanceContext {
    pub accounts: Vec<Account>,
    pub recent_transactions: Vec<Transaction>,
    pub budgets: Vec<BudgetStatus>,
}

/// A budget with its allocation figures for today
#[derive(Debug)]
pub struct BudgetStatus {
    pub budget: Budget,
    pub today_allocation: f64,
    pub spent_today: f64,
}

impl FinanceContext {
    /// Render the context as prompt text
    ///
    /// Empty sections are omitted entirely so a fresh user gets a short
    /// prompt instead of three "none" headers.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if !self.accounts.is_empty() {
            let mut lines = vec!["Accounts:".to_string()];
            for a in &self.accounts {
                let default_note = if a.is_default { " (default)" } else { "" };
                lines.push(format!(
                    "- #{} {} ({}): {:.2} {}{}",
                    a.id, a.name, a.account_type, a.balance, a.currency, default_note
                ));
            }
            sections.push(lines.join("\n"));
        }

        if !self.recent_transactions.is_empty() {
            let mut lines = vec!["Recent transactions:".to_string()];
            for t in &self.recent_transactions {
                lines.push(format!(
                    "- #{} {} {} {:.2} {}: {}",
                    t.id, t.date, t.tx_type, t.amount, t.currency, t.description
                ));
            }
            sections.push(lines.join("\n"));
        }

        if !self.budgets.is_empty() {
            let mut lines = vec!["Budgets:".to_string()];
            for b in &self.budgets {
                lines.push(format!(
                    "- #{} {:.2} {} from {} to {}. Today: {:.2} allocated, {:.2} spent",
                    b.budget.id,
                    b.budget.total_amount,
                    b.budget.currency,
                    b.budget.start_date,
                    b.budget.end_date,
                    b.today_allocation,
                    b.spent_today
                ));
            }
            sections.push(lines.join("\n"));
        }

        sections.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.recent_transactions.is_empty() && self.budgets.is_empty()
    }
}

/// Assembles the finance context from the ledger
pub struct ContextAssembler<'a> {
    db: &'a Database,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Build the snapshot for one user
    pub fn for_user(&self, user_id: i64) -> Result<FinanceContext> {
        let today = Utc::now().date_naive();

        let accounts = self.db.list_accounts(user_id)?;
        let recent_transactions = self
            .db
            .recent_transactions(user_id, RECENT_TRANSACTION_LIMIT)?;

        let mut budgets = Vec::new();
        for budget in self.db.list_budgets(user_id)? {
            if today < budget.start_date || today > budget.end_date {
                continue;
            }
            let expenses =
                self.db
                    .expenses_in_period(user_id, &budget.currency, budget.start_date, today)?;
            let today_allocation = crate::budget::daily_allocation(today, &budget, &expenses);
            let spent_today = crate::budget::spent_on(today, &budget.currency, &expenses);
            budgets.push(BudgetStatus {
                budget,
                today_allocation,
                spent_today,
            });
        }

        Ok(FinanceContext {
            accounts,
            recent_transactions,
            budgets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountType, NewAccount, NewBudget, NewTransaction, TransactionType};

    fn seed(db: &Database) {
        db.create_account(&NewAccount {
            user_id: 1,
            name: "Wallet".to_string(),
            currency: "USD".to_string(),
            account_type: AccountType::Cash,
            balance: 50.0,
            is_default: true,
        })
        .unwrap();
        db.create_transaction(&NewTransaction {
            user_id: 1,
            account_id: 1,
            tx_type: TransactionType::Expense,
            amount: 4.5,
            currency: "USD".to_string(),
            date: Utc::now().date_naive(),
            description: "coffee".to_string(),
        })
        .unwrap();
    }

    #[test]
    fn test_empty_context_renders_empty() {
        let db = Database::in_memory().unwrap();
        let ctx = ContextAssembler::new(&db).for_user(1).unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.render(), "");
    }

    #[test]
    fn test_context_lists_accounts_and_transactions() {
        let db = Database::in_memory().unwrap();
        seed(&db);

        let ctx = ContextAssembler::new(&db).for_user(1).unwrap();
        let rendered = ctx.render();
        assert!(rendered.contains("Wallet"));
        assert!(rendered.contains("(default)"));
        assert!(rendered.contains("coffee"));
        assert!(!rendered.contains("Budgets:"));
    }

    #[test]
    fn test_context_includes_active_budget_allocation() {
        let db = Database::in_memory().unwrap();
        seed(&db);

        let today = Utc::now().date_naive();
        db.create_budget(&NewBudget {
            user_id: 1,
            total_amount: 70.0,
            currency: "USD".to_string(),
            start_date: today,
            end_date: today + chrono::Duration::days(6),
        })
        .unwrap();

        let ctx = ContextAssembler::new(&db).for_user(1).unwrap();
        assert_eq!(ctx.budgets.len(), 1);
        assert!((ctx.budgets[0].today_allocation - 10.0).abs() < 1e-9);
        assert!((ctx.budgets[0].spent_today - 4.5).abs() < 1e-9);
        assert!(ctx.render().contains("Budgets:"));
    }

    #[test]
    fn test_expired_budget_excluded() {
        let db = Database::in_memory().unwrap();
        let today = Utc::now().date_naive();
        db.create_budget(&NewBudget {
            user_id: 1,
            total_amount: 70.0,
            currency: "USD".to_string(),
            start_date: today - chrono::Duration::days(20),
            end_date: today - chrono::Duration::days(14),
        })
        .unwrap();

        let ctx = ContextAssembler::new(&db).for_user(1).unwrap();
        assert!(ctx.budgets.is_empty());
    }

    #[test]
    fn test_context_scoped_to_user() {
        let db = Database::in_memory().unwrap();
        seed(&db);

        let ctx = ContextAssembler::new(&db).for_user(2).unwrap();
        assert!(ctx.is_empty());
    }
}

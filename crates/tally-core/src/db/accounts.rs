//! Account operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Account, AccountType, NewAccount, RecordType};

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let account_type: String = row.get("account_type")?;
    let created_at: String = row.get("created_at")?;
    Ok(Account {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        currency: row.get("currency")?,
        account_type: account_type.parse().unwrap_or(AccountType::Bank),
        balance: row.get("balance")?,
        is_default: row.get("is_default")?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Create an account with a fresh sequential business ID
    ///
    /// The first account a user creates becomes their default even when the
    /// caller did not ask for it.
    pub fn create_account(&self, new: &NewAccount) -> Result<Account> {
        let id = self.next_sequential_id(RecordType::Account)?;
        let conn = self.conn()?;

        let has_accounts: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE user_id = ?)",
            params![new.user_id],
            |row| row.get(0),
        )?;
        let is_default = new.is_default || !has_accounts;

        if is_default {
            conn.execute(
                "UPDATE accounts SET is_default = 0 WHERE user_id = ?",
                params![new.user_id],
            )?;
        }

        conn.execute(
            r#"
            INSERT INTO accounts (id, user_id, name, currency, account_type, balance, is_default)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                new.user_id,
                new.name,
                new.currency,
                new.account_type.as_str(),
                new.balance,
                is_default,
            ],
        )?;

        self.find_account(new.user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("account {} just created", id)))
    }

    /// Find an account by business ID, scoped to its owner
    pub fn find_account(&self, user_id: i64, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT * FROM accounts WHERE user_id = ? AND id = ?",
                params![user_id, id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    /// The user's default account, if any
    pub fn default_account(&self, user_id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT * FROM accounts WHERE user_id = ? AND is_default = 1",
                params![user_id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    /// List all accounts for a user, oldest first
    pub fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM accounts WHERE user_id = ? ORDER BY id")?;
        let accounts = stmt
            .query_map(params![user_id], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    /// Apply a signed delta to an account balance
    pub fn adjust_account_balance(&self, user_id: i64, id: i64, delta: f64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET balance = balance + ? WHERE user_id = ? AND id = ?",
            params![delta, user_id, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("account {}", id)));
        }
        Ok(())
    }
}

//! Transaction operations, keyed by sequential business ID

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, RecordType, Transaction, TransactionType};

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let tx_type: String = row.get("tx_type")?;
    let date: String = row.get("date")?;
    let created_at: String = row.get("created_at")?;
    Ok(Transaction {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        account_id: row.get("account_id")?,
        tx_type: tx_type.parse().unwrap_or(TransactionType::Expense),
        amount: row.get("amount")?,
        currency: row.get("currency")?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").unwrap_or_default(),
        description: row.get("description")?,
        created_at: parse_datetime(&created_at),
    })
}

/// Fields that `update_transaction` may patch
#[derive(Debug, Clone, Default)]
pub(crate) struct TransactionPatch {
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

impl Database {
    /// Create a transaction with a fresh sequential business ID
    ///
    /// The stored amount is the non-negative magnitude of what the caller
    /// passed; sign semantics live in `tx_type`.
    pub fn create_transaction(&self, new: &NewTransaction) -> Result<Transaction> {
        let id = self.next_sequential_id(RecordType::Transaction)?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO transactions (id, user_id, account_id, tx_type, amount, currency, date, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                new.user_id,
                new.account_id,
                new.tx_type.as_str(),
                new.amount.abs(),
                new.currency,
                new.date.to_string(),
                new.description,
            ],
        )?;

        self.find_transaction(new.user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("transaction {} just created", id)))
    }

    /// Find a transaction by business ID, scoped to its owner
    pub fn find_transaction(&self, user_id: i64, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                "SELECT * FROM transactions WHERE user_id = ? AND id = ?",
                params![user_id, id],
                transaction_from_row,
            )
            .optional()?;
        Ok(tx)
    }

    /// Most recent transactions for a user, newest first
    pub fn recent_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM transactions WHERE user_id = ? ORDER BY date DESC, id DESC LIMIT ?",
        )?;
        let txns = stmt
            .query_map(params![user_id, limit], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txns)
    }

    /// All expense transactions in a currency within a date range, used by
    /// the budget allocation engine
    pub fn expenses_in_period(
        &self,
        user_id: i64,
        currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM transactions
            WHERE user_id = ? AND currency = ? AND tx_type = 'expense'
              AND date >= ? AND date <= ?
            ORDER BY date, id
            "#,
        )?;
        let txns = stmt
            .query_map(
                params![user_id, currency, from.to_string(), to.to_string()],
                transaction_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txns)
    }

    /// Patch a transaction by business ID; returns the updated record
    pub(crate) fn update_transaction(
        &self,
        user_id: i64,
        id: i64,
        patch: &TransactionPatch,
    ) -> Result<Option<Transaction>> {
        let Some(existing) = self.find_transaction(user_id, id)? else {
            return Ok(None);
        };

        let amount = patch.amount.map(f64::abs).unwrap_or(existing.amount);
        let description = patch
            .description
            .clone()
            .unwrap_or_else(|| existing.description.clone());
        let date = patch.date.unwrap_or(existing.date);

        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET amount = ?, description = ?, date = ? WHERE user_id = ? AND id = ?",
            params![amount, description, date.to_string(), user_id, id],
        )?;

        self.find_transaction(user_id, id)
    }

    /// Delete a transaction by business ID; returns the deleted record
    pub fn delete_transaction(&self, user_id: i64, id: i64) -> Result<Option<Transaction>> {
        let Some(existing) = self.find_transaction(user_id, id)? else {
            return Ok(None);
        };

        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM transactions WHERE user_id = ? AND id = ?",
            params![user_id, id],
        )?;

        Ok(Some(existing))
    }
}

//! Budget operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Budget, NewBudget, RecordType};

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let start_date: String = row.get("start_date")?;
    let end_date: String = row.get("end_date")?;
    let created_at: String = row.get("created_at")?;
    Ok(Budget {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        total_amount: row.get("total_amount")?,
        currency: row.get("currency")?,
        start_date: NaiveDate::parse_from_str(&start_date, "%Y-%m-%d").unwrap_or_default(),
        end_date: NaiveDate::parse_from_str(&end_date, "%Y-%m-%d").unwrap_or_default(),
        created_at: parse_datetime(&created_at),
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Database {
    /// Create a budget with a fresh sequential business ID
    ///
    /// Fails with `InvalidData` if the user already has a budget in this
    /// currency; at most one may be open at a time. The invariant lives in
    /// the store's unique index, so concurrent creates on separate
    /// connections cannot both succeed.
    pub fn create_budget(&self, new: &NewBudget) -> Result<Budget> {
        let id = self.next_sequential_id(RecordType::Budget)?;
        let conn = self.conn()?;

        if let Err(err) = conn.execute(
            r#"
            INSERT INTO budgets (id, user_id, total_amount, currency, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                new.user_id,
                new.total_amount,
                new.currency,
                new.start_date.to_string(),
                new.end_date.to_string(),
            ],
        ) {
            if is_unique_violation(&err) {
                return Err(Error::InvalidData(format!(
                    "budget already exists for currency {}",
                    new.currency
                )));
            }
            return Err(err.into());
        }

        self.find_budget(new.user_id, id)?
            .ok_or_else(|| Error::NotFound(format!("budget {} just created", id)))
    }

    /// Find a budget by business ID, scoped to its owner
    pub fn find_budget(&self, user_id: i64, id: i64) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                "SELECT * FROM budgets WHERE user_id = ? AND id = ?",
                params![user_id, id],
                budget_from_row,
            )
            .optional()?;
        Ok(budget)
    }

    /// Find the user's budget for a currency, if one exists
    pub fn find_budget_by_currency(&self, user_id: i64, currency: &str) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        let budget = conn
            .query_row(
                "SELECT * FROM budgets WHERE user_id = ? AND currency = ?",
                params![user_id, currency],
                budget_from_row,
            )
            .optional()?;
        Ok(budget)
    }

    /// List all budgets for a user
    pub fn list_budgets(&self, user_id: i64) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM budgets WHERE user_id = ? ORDER BY id")?;
        let budgets = stmt
            .query_map(params![user_id], budget_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(budgets)
    }

    /// Delete a budget by business ID; returns the deleted record
    pub fn delete_budget(&self, user_id: i64, id: i64) -> Result<Option<Budget>> {
        let Some(existing) = self.find_budget(user_id, id)? else {
            return Ok(None);
        };

        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM budgets WHERE user_id = ? AND id = ?",
            params![user_id, id],
        )?;

        Ok(Some(existing))
    }
}

//! Usage/telemetry sink records
//!
//! One row per provider response (carrying token counts and the model
//! that actually answered), plus one per web-search batch. The
//! `referral_bonus` kind is written by layers outside this core.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::UsageKind;

/// A recorded usage event
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub id: i64,
    pub user_id: i64,
    pub thread_id: Option<i64>,
    pub kind: UsageKind,
    pub amount: i64,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub model: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Database {
    /// Record a usage event
    pub fn record_usage(
        &self,
        user_id: i64,
        thread_id: Option<i64>,
        kind: UsageKind,
        amount: i64,
        input_tokens: Option<i64>,
        output_tokens: Option<i64>,
        model: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO usage_events (user_id, thread_id, kind, amount, input_tokens, output_tokens, model)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                thread_id,
                kind.as_str(),
                amount,
                input_tokens,
                output_tokens,
                model,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All usage events for a user, oldest first
    pub fn usage_events(&self, user_id: i64) -> Result<Vec<UsageEvent>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM usage_events WHERE user_id = ? ORDER BY id")?;
        let events = stmt
            .query_map(params![user_id], |row| {
                let kind: String = row.get("kind")?;
                let created_at: String = row.get("created_at")?;
                Ok(UsageEvent {
                    id: row.get("id")?,
                    user_id: row.get("user_id")?,
                    thread_id: row.get("thread_id")?,
                    kind: kind.parse().unwrap_or(UsageKind::Completion),
                    amount: row.get("amount")?,
                    input_tokens: row.get("input_tokens")?,
                    output_tokens: row.get("output_tokens")?,
                    model: row.get("model")?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }
}

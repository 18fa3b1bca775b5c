//! Thread and stored-message operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{AssistantType, Role, StoredMessage, Thread};
use crate::provider::ContentBlock;

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    let assistant_type: String = row.get("assistant_type")?;
    let created_at: String = row.get("created_at")?;
    Ok(Thread {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        assistant_type: assistant_type.parse().unwrap_or_default(),
        web_search_enabled: row.get("web_search_enabled")?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Create a thread
    pub fn create_thread(
        &self,
        user_id: i64,
        assistant_type: AssistantType,
        web_search_enabled: bool,
    ) -> Result<Thread> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO threads (user_id, assistant_type, web_search_enabled) VALUES (?, ?, ?)",
            params![user_id, assistant_type.as_str(), web_search_enabled],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.find_thread(id)?
            .ok_or_else(|| Error::NotFound(format!("thread {} just created", id)))
    }

    /// Find a thread by ID
    pub fn find_thread(&self, id: i64) -> Result<Option<Thread>> {
        let conn = self.conn()?;
        let thread = conn
            .query_row(
                "SELECT * FROM threads WHERE id = ?",
                params![id],
                thread_from_row,
            )
            .optional()?;
        Ok(thread)
    }

    /// Change the assistant type of an existing thread
    ///
    /// Threads are never deleted by the core; a mid-conversation topic
    /// switch mutates the type instead.
    pub fn set_thread_assistant_type(&self, id: i64, assistant_type: AssistantType) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE threads SET assistant_type = ? WHERE id = ?",
            params![assistant_type.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("thread {}", id)));
        }
        Ok(())
    }

    /// Append a message to a thread
    pub fn append_message(
        &self,
        thread_id: i64,
        role: Role,
        content: &[ContentBlock],
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (thread_id, role, content) VALUES (?, ?, ?)",
            params![thread_id, role.as_str(), serde_json::to_string(content)?],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All messages for a thread, ordered by creation time
    ///
    /// This is how a conversation turn is reconstructed; there is no
    /// persisted turn entity.
    pub fn thread_messages(&self, thread_id: i64) -> Result<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE thread_id = ? ORDER BY created_at, id",
        )?;

        let rows = stmt.query_map(params![thread_id], |row| {
            let role: String = row.get("role")?;
            let content: String = row.get("content")?;
            let created_at: String = row.get("created_at")?;
            Ok((
                row.get::<_, i64>("id")?,
                row.get::<_, i64>("thread_id")?,
                role,
                content,
                created_at,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, thread_id, role, content, created_at) = row?;
            messages.push(StoredMessage {
                id,
                thread_id,
                role: role.parse().unwrap_or(Role::User),
                content: serde_json::from_str(&content)?,
                created_at: parse_datetime(&created_at),
            });
        }
        Ok(messages)
    }
}

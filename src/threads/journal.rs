//! SQLite journal of thread messages.
//!
//! Messages are only ever inserted, keyed by `(thread_id, seq)`, mirroring the
//! append-only conversation they record.

use crate::conversation::{Conversation, Message};
use crate::error::{Result, TolkError};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS thread_messages (
    thread_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    role TEXT NOT NULL,
    message_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (thread_id, seq)
);
"#;

/// Append-only SQLite store for conversation history.
pub struct ThreadJournal {
    conn: Mutex<Connection>,
}

impl ThreadJournal {
    /// Open (or create) a journal at the given path.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened thread journal at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory journal (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TolkError::ThreadStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Load a thread's history. Unknown threads load as empty conversations.
    #[instrument(skip(self))]
    pub fn load(&self, thread_id: &str) -> Result<Conversation> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT message_json FROM thread_messages WHERE thread_id = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![thread_id], |row| row.get::<_, String>(0))?;

        let mut messages = Vec::new();
        for row in rows {
            let message: Message = serde_json::from_str(&row?)?;
            messages.push(message);
        }

        debug!("Loaded {} messages for thread {}", messages.len(), thread_id);
        Conversation::from_messages(thread_id, messages)
    }

    /// Record messages starting at sequence number `start_seq`.
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    pub fn append(&self, thread_id: &str, start_seq: usize, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        for (offset, message) in messages.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO thread_messages (thread_id, seq, role, message_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    thread_id,
                    (start_seq + offset) as i64,
                    message.role().to_string(),
                    serde_json::to_string(message)?,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a thread's history, returning the number of removed messages.
    pub fn delete(&self, thread_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM thread_messages WHERE thread_id = ?1",
            params![thread_id],
        )?;
        Ok(removed)
    }

    /// Number of journaled messages for a thread.
    pub fn message_count(&self, thread_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM thread_messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

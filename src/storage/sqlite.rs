//! SQLite-based storage implementation

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, error, info, warn};

use super::models::{Draft, HistoryRecord};

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// SQLite-backed store for settings, the draft and send history
///
/// Uses a single connection with Mutex for simplicity (SQLite handles locking internally).
pub struct StudioStore {
    /// Database connection (protected by mutex for thread safety)
    conn: Mutex<Connection>,
}

impl StudioStore {
    /// Create or open a store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening studio store at {:?}", path);

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory store, contents are lost when dropped
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn initialize_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS drafts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                channels TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'sent',
                recipient_count INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_sent_at
             ON history(sent_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
            [],
        )?;

        debug!("Studio store schema initialized");
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Insert or overwrite a setting
    pub fn set_setting(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        debug!("Stored setting {}", key);
        Ok(())
    }

    /// Upsert several settings in one transaction, all or nothing
    pub fn set_settings(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in entries {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        debug!("Stored {} settings", entries.len());
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Read a setting, `None` if it was never written
    pub fn get_setting(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock();
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    // =========================================================================
    // Draft
    // =========================================================================

    /// Save the working draft, updating the existing row if there is one
    ///
    /// Returns the draft's ID.
    pub fn save_draft(&self, title: &str, body: &str) -> StorageResult<i64> {
        let conn = self.conn.lock();
        let now = Utc::now();

        let existing: Option<i64> = conn
            .query_row("SELECT id FROM drafts ORDER BY id LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE drafts SET title = ?1, body = ?2, updated_at = ?3 WHERE id = ?4",
                    params![title, body, now, id],
                )?;
                debug!("Updated draft {}", id);
                Ok(id)
            }
            None => {
                conn.execute(
                    "INSERT INTO drafts (title, body, updated_at) VALUES (?1, ?2, ?3)",
                    params![title, body, now],
                )?;
                let id = conn.last_insert_rowid();
                debug!("Created draft {}", id);
                Ok(id)
            }
        }
    }

    /// Load the working draft, if one was ever saved
    pub fn get_draft(&self) -> StorageResult<Option<Draft>> {
        let conn = self.conn.lock();
        let draft = conn
            .query_row(
                "SELECT id, title, body, updated_at FROM drafts ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok(Draft {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        body: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(draft)
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Append a send record, returning its ID
    pub fn add_history(&self, record: &HistoryRecord) -> StorageResult<i64> {
        let channels = serde_json::to_string(&record.channels)?;
        let conn = self.conn.lock();

        let result = conn.execute(
            "INSERT INTO history (title, body, channels, status, recipient_count, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.title,
                record.body,
                channels,
                record.status,
                record.recipient_count,
                record.sent_at,
            ],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                info!("Recorded send {} ({} recipients)", id, record.recipient_count);
                Ok(id)
            }
            Err(e) => {
                error!("Failed to record send '{}': {}", record.title, e);
                Err(e.into())
            }
        }
    }

    /// Most recent send records first
    pub fn list_history(&self, limit: usize) -> StorageResult<Vec<HistoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, body, channels, status, recipient_count, sent_at
             FROM history ORDER BY sent_at DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let channels: String = row.get(3)?;
            let sent_at: DateTime<Utc> = row.get(6)?;
            Ok((
                HistoryRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    body: row.get(2)?,
                    channels: Vec::new(),
                    status: row.get(4)?,
                    recipient_count: row.get(5)?,
                    sent_at,
                },
                channels,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (mut record, channels) = row?;
            record.channels = serde_json::from_str(&channels).unwrap_or_else(|e| {
                warn!("Unreadable channels for history {}: {}", record.id, e);
                Vec::new()
            });
            records.push(record);
        }
        Ok(records)
    }
}

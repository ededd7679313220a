//! Storage module for the studio's persistent state
//!
//! Provides SQLite-based local storage for:
//! - Key-value settings (BotHelp/GetCourse credentials, test recipient)
//! - The single working draft
//! - Append-only send history

mod models;
mod sqlite;

pub use models::{Draft, HistoryRecord};
pub use sqlite::{StorageError, StorageResult, StudioStore};

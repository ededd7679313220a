//! Database models for drafts and send history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single working draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    /// Unique database ID
    pub id: i64,
    pub title: String,
    pub body: String,
    /// When the draft was last saved
    pub updated_at: DateTime<Utc>,
}

/// A newsletter send attempt, appended after the fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique database ID
    pub id: i64,
    pub title: String,
    pub body: String,
    /// Channels the newsletter went out on (e.g. "telegram", "email")
    pub channels: Vec<String>,
    /// Delivery status, `sent` unless stated otherwise
    pub status: String,
    /// Number of recipients reached
    pub recipient_count: i64,
    pub sent_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Create a new history record for storage
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        channels: Vec<String>,
        recipient_count: i64,
    ) -> Self {
        Self {
            id: 0, // Will be set by database
            title: title.into(),
            body: body.into(),
            channels,
            status: "sent".to_string(),
            recipient_count,
            sent_at: Utc::now(),
        }
    }

    /// Override the default `sent` status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

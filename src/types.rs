//! Request/response types for the studio API and the BotHelp gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Bot Catalogue
// =============================================================================

/// A BotHelp bot the newsletter can be delivered through
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Bot {
    /// Telegram bot ID, unknown for bots that were never linked
    pub id: Option<&'static str>,
    pub name: &'static str,
    pub username: &'static str,
}

const BOTS: &[Bot] = &[
    Bot {
        id: Some("6646920973"),
        name: "Помощник Екатерины Яхонтовой",
        username: "@finyahontovaBot",
    },
    Bot {
        id: Some("7671567584"),
        name: "Маркетплейс для финансистов",
        username: "@finmarket_yahontova_bot",
    },
    Bot {
        id: None,
        name: "Нейросети с Яхонтовой",
        username: "@ai_yahontova_bot",
    },
    Bot {
        id: Some("8290358498"),
        name: "Розыгрыш подарков с Яхонтовой",
        username: "@birthday_yahontova_bot",
    },
    Bot {
        id: Some("8354192373"),
        name: "Подслушано Финдирам",
        username: "@podslushano_findirom_bot",
    },
];

impl Bot {
    /// Bots configured for this deployment
    pub fn catalogue() -> &'static [Bot] {
        BOTS
    }
}

// =============================================================================
// Credentials & Messages
// =============================================================================

/// OAuth client credentials for BotHelp
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Both halves present
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A single message to one subscriber, built per send request
#[derive(Debug, Clone)]
pub struct Message {
    pub recipient_id: String,
    pub content: String,
}

impl Message {
    /// Build a message from a draft: bold title, blank line, body
    pub fn from_draft(recipient_id: impl Into<String>, title: &str, body: &str) -> Self {
        let content = if title.is_empty() {
            body.to_string()
        } else {
            format!("*{}*\n\n{}", title, body)
        };
        Self {
            recipient_id: recipient_id.into(),
            content,
        }
    }
}

/// Subscriber IDs go into the URL path and must stay a single segment
pub fn is_valid_recipient_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One element of the message-send payload
#[derive(Debug, Serialize)]
pub struct MessageContent<'a> {
    pub content: &'a str,
}

/// Normalized result of a BotHelp API call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    /// HTTP status was in the 2xx range
    pub ok: bool,
    pub status: u16,
    /// Parsed JSON body, or `{"raw": <text>}` when the body is not JSON
    pub data: Value,
}

// =============================================================================
// Studio API Payloads
// =============================================================================

/// Draft as exchanged with the UI
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// Test send request from the editor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestSendRequest {
    #[serde(default)]
    pub subscriber_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

//! Newsletter Studio Library
//!
//! A small service for composing a newsletter draft, sending a one-off test
//! message through BotHelp and keeping a record of past sends.
//!
//! # Architecture
//!
//! ```text
//! Composer UI ──HTTP──▶ Studio API (this) ──HTTPS──▶ BotHelp OAuth + API
//!                         │
//!                         ├── Settings / Draft / History (SQLite)
//!                         ├── Token Cache (in-memory, single entry)
//!                         └── Uploads directory
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Optional credential defaults, the UI can override them
//! export BOTHELP_CLIENT_ID=your_client_id
//! export BOTHELP_CLIENT_SECRET=your_client_secret
//!
//! # Run
//! newsletter-studio
//! ```

pub mod bothelp_api;
pub mod config;
pub mod error;
pub mod server;
pub mod settings;
pub mod storage;
pub mod types;
pub mod uploads;

#[cfg(test)]
pub(crate) mod test_support;

pub use bothelp_api::{BotHelpClient, TokenCache};
pub use config::ServerConfig;
pub use error::ApiError;
pub use server::AppState;
pub use storage::StudioStore;
pub use types::*;

/// Prelude for common imports
pub mod prelude {
    pub use crate::bothelp_api::{BotHelpClient, TokenCache};
    pub use crate::config::ServerConfig;
    pub use crate::error::ApiError;
    pub use crate::settings::{CredentialSource, Settings};
    pub use crate::storage::StudioStore;
    pub use crate::types::*;
}

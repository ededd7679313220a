//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    // =========================================================================
    // HTTP Server
    // =========================================================================
    /// Bind address for the UI/API server
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite database file (settings, draft, history)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory where uploaded images are written and served from
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Built UI bundle (served with an SPA fallback when present)
    pub static_dir: Option<PathBuf>,

    // =========================================================================
    // BotHelp
    // =========================================================================
    /// Environment default for the OAuth client id
    pub bothelp_client_id: Option<String>,

    /// Environment default for the OAuth client secret
    pub bothelp_client_secret: Option<String>,

    /// OAuth token endpoint (client_credentials grant)
    #[serde(default = "default_bothelp_oauth_url")]
    pub bothelp_oauth_url: String,

    /// Base URL of the messaging API
    #[serde(default = "default_bothelp_api_base")]
    pub bothelp_api_base: String,

    /// Outbound request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    // =========================================================================
    // GetCourse
    // =========================================================================
    pub getcourse_account: Option<String>,
    pub getcourse_api_key: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data.db")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_bothelp_oauth_url() -> String {
    "https://oauth.bothelp.io/oauth2/token".to_string()
}

fn default_bothelp_api_base() -> String {
    "https://api.bothelp.io".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

/// Read a variable, treating blank values as unset
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let listen_addr = match (env_opt("LISTEN_ADDR"), env_opt("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => {
                let port: u16 = port.parse().context("Invalid PORT")?;
                format!("0.0.0.0:{}", port)
            }
            (None, None) => default_listen_addr(),
        };

        let http_timeout_secs = match env_opt("HTTP_TIMEOUT_SECS") {
            Some(v) => v.parse().context("Invalid HTTP_TIMEOUT_SECS")?,
            None => default_http_timeout(),
        };

        Ok(Self {
            listen_addr,
            database_path: env_opt("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_database_path),
            uploads_dir: env_opt("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_uploads_dir),
            static_dir: env_opt("STATIC_DIR").map(PathBuf::from),

            bothelp_client_id: env_opt("BOTHELP_CLIENT_ID"),
            bothelp_client_secret: env_opt("BOTHELP_CLIENT_SECRET"),
            bothelp_oauth_url: env_opt("BOTHELP_OAUTH_URL")
                .unwrap_or_else(default_bothelp_oauth_url),
            bothelp_api_base: env_opt("BOTHELP_API_BASE").unwrap_or_else(default_bothelp_api_base),
            http_timeout_secs,

            getcourse_account: env_opt("GETCOURSE_ACCOUNT"),
            getcourse_api_key: env_opt("GETCOURSE_API_KEY"),
        })
    }

    /// Configuration with built-in defaults and no environment credentials
    pub fn with_defaults() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_path: default_database_path(),
            uploads_dir: default_uploads_dir(),
            static_dir: None,
            bothelp_client_id: None,
            bothelp_client_secret: None,
            bothelp_oauth_url: default_bothelp_oauth_url(),
            bothelp_api_base: default_bothelp_api_base(),
            http_timeout_secs: default_http_timeout(),
            getcourse_account: None,
            getcourse_api_key: None,
        }
    }
}

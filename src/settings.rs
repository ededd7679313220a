//! Settings resolution
//!
//! Every setting is resolved through an ordered list of [`ConfigSource`]s:
//! the value stored through the UI first, then the environment default.
//! The first non-empty value wins; a setting with no value resolves to `""`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::storage::{StorageResult, StudioStore};
use crate::types::Credentials;

/// Settings the UI can read and write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    BotHelpClientId,
    BotHelpClientSecret,
    BotHelpTestSubscriberId,
    GetCourseAccount,
    GetCourseApiKey,
}

impl SettingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::BotHelpClientId => "bothelp_client_id",
            SettingKey::BotHelpClientSecret => "bothelp_client_secret",
            SettingKey::BotHelpTestSubscriberId => "bothelp_test_subscriber_id",
            SettingKey::GetCourseAccount => "getcourse_account",
            SettingKey::GetCourseApiKey => "getcourse_api_key",
        }
    }

    /// Changing this setting makes any cached BotHelp token stale
    pub fn is_bothelp_credential(self) -> bool {
        matches!(
            self,
            SettingKey::BotHelpClientId | SettingKey::BotHelpClientSecret
        )
    }
}

/// Where a setting value can come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value saved through the settings API
    Stored(SettingKey),
    /// Environment default captured at startup
    Env(String),
}

/// Settings as returned to the UI (secrets included, this is a single-user tool)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsView {
    pub bothelp_client_id: String,
    pub bothelp_client_secret: String,
    pub bothelp_test_subscriber_id: String,
    pub getcourse_account: String,
    pub getcourse_api_key: String,
}

/// Partial settings update, absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub bothelp_client_id: Option<String>,
    pub bothelp_client_secret: Option<String>,
    pub bothelp_test_subscriber_id: Option<String>,
    pub getcourse_account: Option<String>,
    pub getcourse_api_key: Option<String>,
}

impl SettingsUpdate {
    fn entries(&self) -> Vec<(SettingKey, &str)> {
        [
            (SettingKey::BotHelpClientId, &self.bothelp_client_id),
            (SettingKey::BotHelpClientSecret, &self.bothelp_client_secret),
            (
                SettingKey::BotHelpTestSubscriberId,
                &self.bothelp_test_subscriber_id,
            ),
            (SettingKey::GetCourseAccount, &self.getcourse_account),
            (SettingKey::GetCourseApiKey, &self.getcourse_api_key),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

/// Anything that can hand out BotHelp client credentials
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Result<Credentials, ApiError>;
}

/// Settings backed by the studio store with environment fallbacks
pub struct Settings {
    store: Arc<StudioStore>,
    config: Arc<ServerConfig>,
}

impl Settings {
    pub fn new(store: Arc<StudioStore>, config: Arc<ServerConfig>) -> Self {
        Self { store, config }
    }

    fn env_default(&self, key: SettingKey) -> Option<&String> {
        match key {
            SettingKey::BotHelpClientId => self.config.bothelp_client_id.as_ref(),
            SettingKey::BotHelpClientSecret => self.config.bothelp_client_secret.as_ref(),
            SettingKey::BotHelpTestSubscriberId => None,
            SettingKey::GetCourseAccount => self.config.getcourse_account.as_ref(),
            SettingKey::GetCourseApiKey => self.config.getcourse_api_key.as_ref(),
        }
    }

    /// Sources for a setting, highest priority first
    pub fn sources(&self, key: SettingKey) -> Vec<ConfigSource> {
        let mut sources = vec![ConfigSource::Stored(key)];
        if let Some(value) = self.env_default(key) {
            sources.push(ConfigSource::Env(value.clone()));
        }
        sources
    }

    /// Resolve a setting through its sources
    pub fn resolve(&self, key: SettingKey) -> StorageResult<String> {
        for source in self.sources(key) {
            let value = match source {
                ConfigSource::Stored(key) => self.store.get_setting(key.as_str())?,
                ConfigSource::Env(value) => Some(value),
            };
            if let Some(value) = value
                && !value.is_empty()
            {
                return Ok(value);
            }
        }
        Ok(String::new())
    }

    /// Current values of every setting
    pub fn view(&self) -> StorageResult<SettingsView> {
        Ok(SettingsView {
            bothelp_client_id: self.resolve(SettingKey::BotHelpClientId)?,
            bothelp_client_secret: self.resolve(SettingKey::BotHelpClientSecret)?,
            bothelp_test_subscriber_id: self.resolve(SettingKey::BotHelpTestSubscriberId)?,
            getcourse_account: self.resolve(SettingKey::GetCourseAccount)?,
            getcourse_api_key: self.resolve(SettingKey::GetCourseApiKey)?,
        })
    }

    /// Write the fields present in `update`
    ///
    /// Returns `true` if a BotHelp credential was written.
    pub fn apply(&self, update: &SettingsUpdate) -> StorageResult<bool> {
        let entries = update.entries();
        let rows: Vec<(&str, &str)> = entries
            .iter()
            .map(|(key, value)| (key.as_str(), *value))
            .collect();
        self.store.set_settings(&rows)?;

        let credentials_changed = entries.iter().any(|(key, _)| key.is_bothelp_credential());
        if credentials_changed {
            info!("BotHelp credentials updated");
        }
        Ok(credentials_changed)
    }
}

impl CredentialSource for Settings {
    fn credentials(&self) -> Result<Credentials, ApiError> {
        Ok(Credentials::new(
            self.resolve(SettingKey::BotHelpClientId)?,
            self.resolve(SettingKey::BotHelpClientSecret)?,
        ))
    }
}

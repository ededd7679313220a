//! BotHelp API Client
//!
//! Handles:
//! - Access Token management (client_credentials grant, cached until close to expiry)
//! - Authenticated calls against the messaging API with normalized results
//! - Sending a single message to one subscriber

use parking_lot::RwLock;
use reqwest::{Client, Method, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::settings::CredentialSource;
use crate::types::{ApiResponse, Message, MessageContent, is_valid_recipient_id};

// =============================================================================
// API Constants
// =============================================================================

/// Content type BotHelp expects on the message-send endpoint
pub const VND_API_JSON: &str = "application/vnd.api+json";

const BOTS_PATH: &str = "/v1/bots/";

/// Lifetime assumed when the token response carries no `expires_in`
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// A token this close to expiry is treated as expired
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on the lifetime taken from `expires_in` (30 days)
const MAX_TOKEN_LIFETIME_SECS: u64 = 30 * 24 * 3600;

// =============================================================================
// Access Token Management
// =============================================================================

/// Cached access token with expiry tracking
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(access_token: String, expires_in_secs: u64) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs.min(MAX_TOKEN_LIFETIME_SECS));
        let now = Instant::now();
        Self {
            access_token,
            expires_at: now.checked_add(lifetime).unwrap_or(now),
        }
    }

    fn is_valid(&self) -> bool {
        self.expires_at > Instant::now() + REFRESH_MARGIN
    }
}

/// Cache contents plus a generation bumped by every invalidation.
///
/// A refresh only stores its token if the generation is unchanged, so a
/// refresh that raced with a credentials change cannot resurrect a token
/// issued for the old credentials.
#[derive(Debug, Default)]
struct TokenSlot {
    token: Option<CachedToken>,
    generation: u64,
}

/// Token response from the OAuth endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Single-entry cache of the BotHelp access token
///
/// Concurrent callers that find the token expired may each refresh it; the
/// last successful refresh wins. Issuing an extra token is harmless.
pub struct TokenCache {
    oauth_url: String,
    http_client: Client,
    credentials: Arc<dyn CredentialSource>,
    slot: RwLock<TokenSlot>,
}

impl TokenCache {
    pub fn new(
        oauth_url: impl Into<String>,
        http_client: Client,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            oauth_url: oauth_url.into(),
            http_client,
            credentials,
            slot: RwLock::new(TokenSlot::default()),
        }
    }

    /// Get a valid access token (refreshes if missing or about to expire)
    pub async fn get_access_token(&self) -> Result<String, ApiError> {
        let generation = {
            let guard = self.slot.read();
            if let Some(ref token) = guard.token
                && token.is_valid()
            {
                debug!("Using cached BotHelp access token");
                return Ok(token.access_token.clone());
            }
            guard.generation
        };

        self.refresh_token(generation).await
    }

    /// Drop the cached token so the next call requests a fresh one
    pub fn invalidate(&self) {
        let mut guard = self.slot.write();
        guard.token = None;
        guard.generation += 1;
        info!("BotHelp access token invalidated");
    }

    async fn refresh_token(&self, generation: u64) -> Result<String, ApiError> {
        let credentials = self.credentials.credentials()?;
        if !credentials.is_complete() {
            return Err(ApiError::Configuration(
                "BotHelp Client ID and Client Secret are not set in settings".to_string(),
            ));
        }

        debug!("Requesting BotHelp access token for client {}", credentials.client_id);

        let response = self
            .http_client
            .post(&self.oauth_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("BotHelp token request failed: {}", e);
                ApiError::from(e)
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("BotHelp token error: {}", status);
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let token_resp: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse BotHelp token response: {}", e);
            ApiError::Upstream {
                status: status.as_u16(),
                body: text.clone(),
            }
        })?;

        let expires_in = token_resp.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let cached = CachedToken::new(token_resp.access_token.clone(), expires_in);

        {
            let mut guard = self.slot.write();
            if guard.generation == generation {
                guard.token = Some(cached);
            } else {
                warn!("Credentials changed during token refresh, not caching the result");
            }
        }

        info!(
            "Refreshed BotHelp access token (expires in {}s)",
            expires_in
        );
        Ok(token_resp.access_token)
    }
}

// =============================================================================
// BotHelp API Client
// =============================================================================

/// BotHelp messaging API client
#[derive(Clone)]
pub struct BotHelpClient {
    api_base: String,
    http_client: Client,
    tokens: Arc<TokenCache>,
}

impl BotHelpClient {
    /// Create a client for the endpoints in `config`
    pub fn new(
        config: &ServerConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let tokens = TokenCache::new(
            config.bothelp_oauth_url.clone(),
            http_client.clone(),
            credentials,
        );

        Ok(Self {
            api_base: config.bothelp_api_base.trim_end_matches('/').to_string(),
            http_client,
            tokens: Arc::new(tokens),
        })
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Perform one authenticated request
    ///
    /// Non-2xx answers are not errors: they come back with `ok: false`.
    /// Bodies that are not JSON are wrapped as `{"raw": <text>}`.
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        content_type: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.tokens.get_access_token().await?;
        let url = format!("{}{}", self.api_base, path);

        debug!("BotHelp {} {}", method, path);

        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(token)
            .header(
                header::CONTENT_TYPE,
                content_type.unwrap_or("application/json"),
            );
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body).map_err(|e| {
                ApiError::Internal(format!("Failed to encode request body: {}", e))
            })?);
        }

        let response = request.send().await.map_err(|e| {
            error!("BotHelp request to {} failed: {}", path, e);
            ApiError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await?;
        let data = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));

        if !status.is_success() {
            warn!("BotHelp {} answered {}", path, status);
        }

        Ok(ApiResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            data,
        })
    }

    /// List the account's bots, used as a connection check
    pub async fn list_bots(&self) -> Result<ApiResponse, ApiError> {
        self.call(BOTS_PATH, Method::GET, None, None).await
    }

    /// Send one message to one subscriber
    pub async fn send_message(&self, message: &Message) -> Result<ApiResponse, ApiError> {
        if !is_valid_recipient_id(&message.recipient_id) {
            warn!("Rejected subscriber ID {:?}", message.recipient_id);
            return Err(ApiError::BadRequest(format!(
                "Invalid Subscriber ID: {}",
                message.recipient_id
            )));
        }

        let path = format!("/v1/subscribers/{}/messages", message.recipient_id);
        let payload = serde_json::to_value([MessageContent {
            content: &message.content,
        }])
        .map_err(|e| ApiError::Internal(format!("Failed to encode message: {}", e)))?;

        debug!(
            "Sending message to subscriber {}: {} chars",
            message.recipient_id,
            message.content.chars().count()
        );

        let result = self
            .call(&path, Method::POST, Some(&payload), Some(VND_API_JSON))
            .await?;

        if result.ok {
            info!("Message sent to subscriber {}", message.recipient_id);
        }
        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockUpstream, StaticCredentials, UpstreamBehavior};

    fn client_for(upstream: &MockUpstream, credentials: Arc<dyn CredentialSource>) -> BotHelpClient {
        let mut config = ServerConfig::with_defaults();
        config.bothelp_oauth_url = upstream.oauth_url();
        config.bothelp_api_base = upstream.base_url.clone();
        BotHelpClient::new(&config, credentials).unwrap()
    }

    #[test]
    fn test_cached_token_expiry() {
        let token = CachedToken::new("test_token".to_string(), 3600);
        assert!(token.is_valid());

        // Inside the refresh margin
        let short_token = CachedToken::new("test_token".to_string(), 30);
        assert!(!short_token.is_valid());
    }

    #[test]
    fn test_cached_token_huge_expires_in_is_clamped() {
        let token = CachedToken::new("test_token".to_string(), u64::MAX);
        assert!(token.is_valid());
        assert!(token.expires_at <= Instant::now() + Duration::from_secs(MAX_TOKEN_LIFETIME_SECS));
    }

    #[tokio::test]
    async fn test_huge_expires_in_from_upstream_is_cached() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            expires_in: Some(u64::MAX),
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let first = client.tokens().get_access_token().await.unwrap();
        let second = client.tokens().get_access_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(upstream.token_requests(), 1);
    }

    #[tokio::test]
    async fn test_token_reused_within_validity_window() {
        let upstream = MockUpstream::start(UpstreamBehavior::default()).await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let first = client.tokens().get_access_token().await.unwrap();
        let second = client.tokens().get_access_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(upstream.token_requests(), 1);
    }

    #[tokio::test]
    async fn test_token_near_expiry_is_refreshed() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            expires_in: Some(30),
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let first = client.tokens().get_access_token().await.unwrap();
        let second = client.tokens().get_access_token().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(upstream.token_requests(), 2);
    }

    #[tokio::test]
    async fn test_missing_expires_in_defaults_to_an_hour() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            expires_in: None,
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        client.tokens().get_access_token().await.unwrap();
        client.tokens().get_access_token().await.unwrap();
        assert_eq!(upstream.token_requests(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_token() {
        let upstream = MockUpstream::start(UpstreamBehavior::default()).await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let first = client.tokens().get_access_token().await.unwrap();
        client.tokens().invalidate();
        let second = client.tokens().get_access_token().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(upstream.token_requests(), 2);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_configuration_error() {
        let upstream = MockUpstream::start(UpstreamBehavior::default()).await;
        let client = client_for(&upstream, StaticCredentials::arc("id", ""));

        let err = client.tokens().get_access_token().await.unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
        assert_eq!(upstream.token_requests(), 0);
    }

    #[tokio::test]
    async fn test_token_endpoint_failure_is_upstream_error() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            token_status: 401,
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "wrong"));

        let err = client.list_bots().await.unwrap_err();
        match err {
            ApiError::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(upstream.api_requests().is_empty());
    }

    #[tokio::test]
    async fn test_call_sends_bearer_and_parses_json() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            api_body: r#"{"data":[{"id":1}]}"#.to_string(),
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let result = client.list_bots().await.unwrap();
        assert!(result.ok);
        assert_eq!(result.status, 200);
        assert_eq!(result.data, json!({"data": [{"id": 1}]}));

        let requests = upstream.api_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/v1/bots/");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer token-1"));
        assert_eq!(
            requests[0].content_type.as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_upstream_401_is_normalized_not_raised() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            api_status: 401,
            api_body: r#"{"error":"unauthorized"}"#.to_string(),
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let result = client.list_bots().await.unwrap();
        assert_eq!(
            result,
            ApiResponse {
                ok: false,
                status: 401,
                data: json!({"error": "unauthorized"}),
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_body_is_wrapped_as_raw() {
        let upstream = MockUpstream::start(UpstreamBehavior {
            api_status: 502,
            api_body: "<html>Bad Gateway</html>".to_string(),
            ..Default::default()
        })
        .await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let result = client.list_bots().await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.data, json!({"raw": "<html>Bad Gateway</html>"}));
    }

    #[tokio::test]
    async fn test_send_message_payload() {
        let upstream = MockUpstream::start(UpstreamBehavior::default()).await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let message = Message::from_draft("777", "Title", "Body");
        let result = client.send_message(&message).await.unwrap();
        assert!(result.ok);

        let requests = upstream.api_requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/v1/subscribers/777/messages");
        assert_eq!(requests[0].content_type.as_deref(), Some(VND_API_JSON));
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body, json!([{ "content": "*Title*\n\nBody" }]));
    }

    #[tokio::test]
    async fn test_send_message_rejects_path_like_recipient() {
        let upstream = MockUpstream::start(UpstreamBehavior::default()).await;
        let client = client_for(&upstream, StaticCredentials::arc("id", "secret"));

        let message = Message::from_draft("1/../../v1/bots", "", "x");
        let err = client.send_message(&message).await.unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(upstream.token_requests(), 0);
        assert!(upstream.api_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        let upstream = MockUpstream::start(UpstreamBehavior::default()).await;
        let mut config = ServerConfig::with_defaults();
        config.bothelp_oauth_url = upstream.oauth_url();
        config.bothelp_api_base = "http://127.0.0.1:1".to_string();
        let client = BotHelpClient::new(&config, StaticCredentials::arc("id", "secret")).unwrap();

        let err = client.list_bots().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}

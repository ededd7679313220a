//! Studio HTTP API
//!
//! Serves the JSON API consumed by the composer UI, the uploaded images
//! and, when configured, the built UI itself.

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};

use crate::bothelp_api::BotHelpClient;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::settings::{SettingKey, Settings, SettingsUpdate, SettingsView};
use crate::storage::{HistoryRecord, StudioStore};
use crate::types::*;
use crate::uploads::{MAX_UPLOAD_SIZE, UPLOADS_ROUTE, UploadStore};

/// History entries returned to the UI
const HISTORY_LIMIT: usize = 50;

/// Room for multipart framing on top of the file itself
const BODY_LIMIT: usize = MAX_UPLOAD_SIZE + 64 * 1024;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<StudioStore>,
    pub settings: Arc<Settings>,
    pub bothelp: BotHelpClient,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<StudioStore>) -> Result<Self, ApiError> {
        let config = Arc::new(config);
        let settings = Arc::new(Settings::new(store.clone(), config.clone()));
        let bothelp = BotHelpClient::new(&config, settings.clone())?;
        let uploads = UploadStore::new(config.uploads_dir.clone());

        Ok(Self {
            config,
            store,
            settings,
            bothelp,
            uploads,
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.uploads.dir());
    let static_dir = state.config.static_dir.clone();

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/api/bots", get(list_bots))
        .route("/api/draft", get(get_draft).post(save_draft))
        .route("/api/settings", get(get_settings).post(update_settings))
        .route("/api/bothelp/check", get(check_connection))
        .route("/api/bothelp/test", post(send_test))
        .route("/api/upload", post(upload_image))
        .route("/api/history", get(list_history))
        .nest_service(UPLOADS_ROUTE, uploads)
        .with_state(state);

    // Built UI with client-side routing
    if let Some(dir) = static_dir {
        if dir.is_dir() {
            info!("Serving UI from {:?}", dir);
            let index = ServeFile::new(dir.join("index.html"));
            app = app.fallback_service(ServeDir::new(dir).fallback(index));
        } else {
            warn!("STATIC_DIR {:?} is not a directory, UI not served", dir);
        }
    }

    app.layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_request))
}

/// Run the HTTP server
pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware to log all incoming HTTP requests
async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("🌐 HTTP {} {}", method, path);

    let response = next.run(req).await;

    info!("{} {} -> {}", method, path, response.status());

    response
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// =============================================================================
// Bots & Draft
// =============================================================================

async fn list_bots() -> Json<&'static [Bot]> {
    Json(Bot::catalogue())
}

async fn get_draft(State(state): State<AppState>) -> Result<Json<DraftPayload>, ApiError> {
    let draft = state
        .store
        .get_draft()?
        .map(|d| DraftPayload {
            title: d.title,
            body: d.body,
        })
        .unwrap_or_default();
    Ok(Json(draft))
}

async fn save_draft(
    State(state): State<AppState>,
    Json(draft): Json<DraftPayload>,
) -> Result<Json<Value>, ApiError> {
    let id = state.store.save_draft(&draft.title, &draft.body)?;
    Ok(Json(json!({ "ok": true, "id": id })))
}

// =============================================================================
// Settings
// =============================================================================

async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsView>, ApiError> {
    Ok(Json(state.settings.view()?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Value>, ApiError> {
    if state.settings.apply(&update)? {
        state.bothelp.tokens().invalidate();
    }
    Ok(Json(json!({ "ok": true })))
}

// =============================================================================
// BotHelp
// =============================================================================

/// Check the BotHelp connection by listing the account's bots
async fn check_connection(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let result = state.bothelp.list_bots().await?;
    info!("BotHelp connection check: status {}", result.status);
    Ok(Json(result))
}

/// Explicit recipient first, then the configured test subscriber
fn resolve_recipient(explicit: Option<&str>, configured: &str) -> Result<String, ApiError> {
    let recipient = explicit
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or(Some(configured.trim()).filter(|id| !id.is_empty()))
        .ok_or_else(|| {
            ApiError::Configuration("Set your Subscriber ID in settings".to_string())
        })?;

    if !is_valid_recipient_id(recipient) {
        return Err(ApiError::BadRequest(format!(
            "Invalid Subscriber ID: {}",
            recipient
        )));
    }
    Ok(recipient.to_string())
}

/// Send the current draft to a single test subscriber
async fn send_test(
    State(state): State<AppState>,
    Json(request): Json<TestSendRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let configured = state
        .settings
        .resolve(SettingKey::BotHelpTestSubscriberId)?;
    let recipient = resolve_recipient(request.subscriber_id.as_deref(), &configured)?;

    let message = Message::from_draft(recipient, &request.title, &request.body);
    let result = state.bothelp.send_message(&message).await?;
    Ok(Json(result))
}

// =============================================================================
// Uploads & History
// =============================================================================

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("File too large (max: {} bytes)", MAX_UPLOAD_SIZE))
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        let url = state.uploads.save(original_name.as_deref(), &data).await?;

        info!("Uploaded image {}", url);
        return Ok(Json(json!({ "ok": true, "url": url })));
    }

    Err(ApiError::BadRequest("No file received".to_string()))
}

async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    Ok(Json(state.store.list_history(HISTORY_LIMIT)?))
}

// =============================================================================
// Tests
// =============================================================================

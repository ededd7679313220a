//! Simulated BotHelp upstream for tests

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::post,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ApiError;
use crate::settings::CredentialSource;
use crate::types::Credentials;

/// Fixed credentials, no storage involved
pub struct StaticCredentials(pub Credentials);

impl StaticCredentials {
    pub fn arc(client_id: &str, client_secret: &str) -> Arc<dyn CredentialSource> {
        Arc::new(Self(Credentials::new(client_id, client_secret)))
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, ApiError> {
        Ok(self.0.clone())
    }
}

/// How the simulated upstream answers
#[derive(Debug, Clone)]
pub struct UpstreamBehavior {
    pub token_status: u16,
    pub expires_in: Option<u64>,
    pub api_status: u16,
    pub api_body: String,
}

impl Default for UpstreamBehavior {
    fn default() -> Self {
        Self {
            token_status: 200,
            expires_in: Some(3600),
            api_status: 200,
            api_body: r#"{"data":[]}"#.to_string(),
        }
    }
}

/// An API request as seen by the upstream
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

struct MockState {
    behavior: UpstreamBehavior,
    token_requests: AtomicUsize,
    token_forms: Mutex<Vec<HashMap<String, String>>>,
    api_requests: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server standing in for both the OAuth and the messaging API
pub struct MockUpstream {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn start(behavior: UpstreamBehavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            token_requests: AtomicUsize::new(0),
            token_forms: Mutex::new(Vec::new()),
            api_requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/oauth2/token", post(issue_token))
            .fallback(record_api_call)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn oauth_url(&self) -> String {
        format!("{}/oauth2/token", self.base_url)
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    /// Form bodies of every token request, in order
    pub fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.state.token_forms.lock().clone()
    }

    pub fn api_requests(&self) -> Vec<RecordedRequest> {
        self.state.api_requests.lock().clone()
    }
}

async fn issue_token(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    state.token_forms.lock().push(form);

    let behavior = &state.behavior;
    if behavior.token_status != 200 {
        let status = StatusCode::from_u16(behavior.token_status).unwrap();
        return (status, r#"{"error":"invalid_client"}"#).into_response();
    }

    let mut body = json!({
        "access_token": format!("token-{}", n),
        "token_type": "Bearer",
    });
    if let Some(expires_in) = behavior.expires_in {
        body["expires_in"] = json!(expires_in);
    }
    Json(body).into_response()
}

async fn record_api_call(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    state.api_requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body,
    });

    let status = StatusCode::from_u16(state.behavior.api_status).unwrap();
    (status, state.behavior.api_body.clone()).into_response()
}

//! Shared fixtures for the integration tests: an in-process HTTP stub that
//! stands in for both the backend and the identity provider, and builders
//! for clients pointed at it.

use axum::extract::Query;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use domain::session::{now_epoch_secs, TokenSet};
use infrastructure::backend_client::BackendClient;
use infrastructure::config::IdentityConfig;
use infrastructure::identity::OidcClient;
use infrastructure::session_guard::SessionGuard;
use serde_json::Value;
use shared::types::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Identity provider endpoints for the `home` realm, relative to the stub.
pub const OIDC_BASE: &str = "/realms/home/protocol/openid-connect";

pub async fn spawn_http_server(app: Router) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });
    Ok((addr, shutdown_tx))
}

/// Starts `app` and returns its base URL.
pub async fn spawn_stub(app: Router) -> Result<(String, oneshot::Sender<()>)> {
    let (addr, shutdown) = spawn_http_server(app).await?;
    Ok((format!("http://{addr}"), shutdown))
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub body: String,
}

/// Every request the stub has seen, in arrival order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<RecordedRequest>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, request: RecordedRequest) {
        self.0.lock().unwrap().push(request);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.to(path).len()
    }
}

/// A canned stub response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self::with_status(StatusCode::OK, "application/json", value.to_string())
    }

    pub fn text(body: &str) -> Self {
        Self::with_status(StatusCode::OK, "text/plain", body.to_string())
    }

    /// One `data:` event per payload.
    pub fn sse(payloads: &[&str]) -> Self {
        let body = payloads
            .iter()
            .map(|p| format!("data: {p}\n\n"))
            .collect::<String>();
        Self::with_status(StatusCode::OK, "text/event-stream", body)
    }

    pub fn raw_sse(body: &str) -> Self {
        Self::with_status(StatusCode::OK, "text/event-stream", body.to_string())
    }

    pub fn error(status: StatusCode, body: Value) -> Self {
        Self::with_status(status, "application/json", body.to_string())
    }

    pub fn with_status(status: StatusCode, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            content_type,
            body,
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, [(CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

/// A GET/POST route that records each request and answers with the next
/// reply in `replies`, repeating the last one once they run out.
pub fn stub_route(recorder: &Recorder, replies: Vec<Reply>) -> MethodRouter {
    let recorder = recorder.clone();
    let replies = Arc::new(replies);
    let served = Arc::new(AtomicUsize::new(0));
    let handler = move |uri: Uri,
                        Query(query): Query<HashMap<String, String>>,
                        headers: HeaderMap,
                        body: String| {
        let recorder = recorder.clone();
        let replies = Arc::clone(&replies);
        let served = Arc::clone(&served);
        async move {
            recorder.record(RecordedRequest {
                path: uri.path().to_string(),
                query,
                authorization: headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
                body,
            });
            let index = served.fetch_add(1, Ordering::SeqCst);
            let reply = replies[index.min(replies.len() - 1)].clone();
            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }
            reply
        }
    };
    get(handler.clone()).post(handler)
}

/// Unsigned JWT carrying `claims`; the client only decodes the payload.
pub fn fake_jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Token endpoint body as Keycloak returns it.
pub fn token_response(access_token: &str, refresh_token: &str) -> Value {
    serde_json::json!({
        "access_token": access_token,
        "expires_in": 300,
        "refresh_token": refresh_token,
        "refresh_expires_in": 1800,
        "token_type": "Bearer",
    })
}

/// Token set whose access token expires in `lifetime` seconds, with a
/// usable refresh token `refresh-1`.
pub fn token_set(access_token: &str, lifetime: u64) -> TokenSet {
    let now = now_epoch_secs();
    TokenSet {
        access_token: access_token.to_string(),
        expires_at: now + lifetime,
        refresh_token: Some("refresh-1".into()),
        refresh_expires_at: Some(now + 1800),
        id_token: None,
    }
}

pub fn identity_config(base_url: &str) -> IdentityConfig {
    IdentityConfig {
        url: format!("{base_url}/"),
        realm: "home".into(),
        client_id: "mcpfileclient".into(),
    }
}

/// An unauthenticated guard talking to the identity endpoints under
/// `base_url`, with the default five second validity window.
pub fn session_guard(base_url: &str) -> Result<SessionGuard<OidcClient>> {
    let provider = OidcClient::new(identity_config(base_url), Duration::from_secs(5))?;
    Ok(SessionGuard::new(provider, Duration::from_secs(5)))
}

pub fn backend_client(
    base_url: &str,
    guard: Arc<SessionGuard<OidcClient>>,
) -> Result<BackendClient> {
    BackendClient::new(base_url, guard, Duration::from_secs(5), true)
}

/// Backend client whose session is already established with `tokens`.
pub async fn authenticated_backend(base_url: &str, tokens: TokenSet) -> Result<BackendClient> {
    let guard = Arc::new(session_guard(base_url)?);
    guard.establish(tokens).await;
    backend_client(base_url, guard)
}

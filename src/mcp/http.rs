//! HTTP adapter.
//!
//! Every request except `GET /health` and CORS preflights passes the
//! security middleware: the per-client rate limit first, then bearer-key
//! authentication. Only then is the body buffered and handed to the
//! dispatcher on the blocking pool.
//!
//! | Route              | Purpose                              |
//! |--------------------|--------------------------------------|
//! | `GET /health`      | liveness, unauthenticated            |
//! | `POST /mcp`        | one JSON-RPC request per body        |
//! | `GET /api/tools`   | tool definitions and count           |
//! | `GET /api/status`  | counts and monitoring statistics     |

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::mcp::dispatcher::{timeout_reply, Dispatcher};
use crate::mcp::protocol::{peek_id, JsonRpcError, JsonRpcReply, SERVER_NAME};
use crate::mcp::resources;
use crate::monitoring::Monitor;
use crate::rate_limit::RateLimiter;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Client id used when the peer address is unavailable.
const UNKNOWN_CLIENT: &str = "unknown";

/// Shared state behind every HTTP request.
pub struct AppState {
    dispatcher: Dispatcher,
    authenticator: Authenticator,
    limiter: RateLimiter,
    monitor: Monitor,
    max_body_bytes: usize,
    tool_timeout: Option<Duration>,
    prune_interval: Duration,
    stats_interval: Option<Duration>,
    cors_origins: Vec<String>,
}

impl AppState {
    /// Builds the state from a validated configuration.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: &Config) -> Self {
        Self {
            dispatcher,
            authenticator: Authenticator::new(config.auth.api_keys.iter().cloned()),
            limiter: RateLimiter::new(
                config.rate_limit.limit,
                Duration::from_secs(config.rate_limit.window_secs),
            ),
            monitor: Monitor::new(config.monitoring.enabled, config.monitoring.max_records),
            max_body_bytes: config.server.max_body_bytes,
            tool_timeout: (config.server.tool_timeout_secs > 0)
                .then(|| Duration::from_secs(config.server.tool_timeout_secs)),
            prune_interval: Duration::from_secs(config.rate_limit.prune_interval_secs.max(1)),
            stats_interval: (config.monitoring.stats_interval_secs > 0)
                .then(|| Duration::from_secs(config.monitoring.stats_interval_secs)),
            cors_origins: config.server.cors_origins.clone(),
        }
    }

    /// The request monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// The rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Builds the router with the security middleware applied to every route.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/mcp",
            post(mcp).layer(DefaultBodyLimit::max(state.max_body_bytes)),
        )
        .route("/api/tools", get(list_tools))
        .route("/api/status", get(status))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), security))
        .with_state(state)
}

/// Binds `addr` and serves until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    if state.authenticator.key_count() == 0 {
        tracing::warn!("No API keys configured, every protected request will be rejected");
    }

    let pruner = spawn_pruner(Arc::clone(&state));
    let reporter = spawn_stats_reporter(&state);
    let app = router(state);

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    pruner.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    result
}

/// Periodically drops rate-limit entries for idle clients.
fn spawn_pruner(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.prune_interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            state.limiter.prune_idle_clients();
        }
    })
}

/// Periodically logs monitoring stats. Nothing is spawned when monitoring or
/// the interval is disabled.
fn spawn_stats_reporter(state: &Arc<AppState>) -> Option<JoinHandle<()>> {
    let interval = state.stats_interval.filter(|_| state.monitor.is_enabled())?;
    let state = Arc::clone(state);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            state.monitor.log_stats();
        }
    }))
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl+C only");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

/// Rate limit, then authenticate, then forward. Records every request.
async fn security(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let path = req.uri().path().to_string();
    let origin = req.headers().get(header::ORIGIN).cloned();
    let client_id = client_id(&req);

    let (mut response, authenticated) = if req.method() == Method::OPTIONS {
        (StatusCode::NO_CONTENT.into_response(), false)
    } else if path == "/health" {
        (next.run(req).await, false)
    } else {
        guarded(&state, &client_id, req, next).await
    };

    apply_cors(&state.cors_origins, origin.as_ref(), response.headers_mut());
    state.monitor.record(
        &client_id,
        &path,
        response.status().as_u16(),
        authenticated,
        started.elapsed(),
    );
    response
}

async fn guarded(state: &AppState, client_id: &str, req: Request, next: Next) -> (Response, bool) {
    let decision = state.limiter.check(client_id);
    if !decision.allowed {
        let retry_after = decision.retry_after.map_or(1, |d| d.as_secs().max(1));
        return (rate_limited(state.limiter.limit(), retry_after), false);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(Authenticator::extract_bearer);
    let Some(token) = token else {
        return (
            auth_rejected(StatusCode::UNAUTHORIZED, "Missing or malformed Authorization header"),
            false,
        );
    };
    if !state.authenticator.verify(token) {
        tracing::warn!(client_id, "Rejected API key");
        return (auth_rejected(StatusCode::FORBIDDEN, "Invalid API key"), false);
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(state.limiter.limit()));
    headers.insert(
        X_RATELIMIT_REMAINING,
        HeaderValue::from(decision.remaining.unwrap_or(0)),
    );
    (response, true)
}

/// Peer IP from the connection, or `"unknown"`.
fn client_id(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

fn rate_limited(limit: usize, retry_after: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Rate limit exceeded",
            "retry_after": retry_after,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"));
    response
}

fn auth_rejected(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn apply_cors(origins: &[String], request_origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
    if origins.iter().any(|o| o == "*") {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    } else if let Some(origin) = request_origin
        .filter(|o| o.to_str().is_ok_and(|o| origins.iter().any(|allowed| allowed == o)))
    {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Only an over-limit body maps to 413. Any other buffering failure (such as
/// the client going away mid-body) is a 400.
async fn mcp(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let bytes = match body {
        Ok(bytes) => bytes,
        Err(rejection) => {
            tracing::warn!(
                limit = state.max_body_bytes,
                error = %rejection.body_text(),
                "Request body rejected"
            );
            return (
                rejection.status(),
                Json(JsonRpcReply::from(JsonRpcError::parse_error())),
            )
                .into_response();
        }
    };

    let dispatcher = state.dispatcher.clone();
    let request = bytes.clone();
    let task = tokio::task::spawn_blocking(move || dispatcher.handle_bytes(&request));

    let outcome = match state.tool_timeout {
        Some(limit) => tokio::time::timeout(limit, task).await,
        None => Ok(task.await),
    };

    match outcome {
        Ok(Ok(Some(reply))) => Json(reply).into_response(),
        Ok(Ok(None)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Dispatch task failed");
            Json(JsonRpcReply::from(JsonRpcError::internal_error(
                peek_id(&bytes),
                "Internal error",
            )))
            .into_response()
        }
        Err(_) => {
            let id = peek_id(&bytes);
            tracing::warn!(
                id = %id,
                timeout_secs = state.tool_timeout.map_or(0, |d| d.as_secs()),
                "Request timed out"
            );
            Json(timeout_reply(id)).into_response()
        }
    }
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tools = state.dispatcher.registry().list();
    Json(json!({
        "count": tools.len(),
        "tools": tools,
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "tools": state.dispatcher.registry().len(),
        "resources": resources::list_resources().len(),
        "rate_limit": {
            "limit": state.limiter.limit(),
            "window_secs": state.limiter.window().as_secs(),
            "tracked_clients": state.limiter.tracked_clients(),
        },
        "monitoring": state.monitor.stats(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn cors(origins: &[&str], origin: Option<&'static str>) -> HeaderMap {
        let origins: Vec<String> = origins.iter().map(ToString::to_string).collect();
        let origin = origin.map(HeaderValue::from_static);
        let mut headers = HeaderMap::new();
        apply_cors(&origins, origin.as_ref(), &mut headers);
        headers
    }

    #[tokio::test]
    async fn stats_reporter_follows_monitoring_settings() {
        let dispatcher = Dispatcher::new(Arc::new(crate::tools::ToolRegistry::new()));
        let mut config = Config::default();

        let state = Arc::new(AppState::new(dispatcher.clone(), &config));
        let reporter = spawn_stats_reporter(&state).unwrap();
        reporter.abort();

        config.monitoring.stats_interval_secs = 0;
        let state = Arc::new(AppState::new(dispatcher.clone(), &config));
        assert!(spawn_stats_reporter(&state).is_none());

        config.monitoring.stats_interval_secs = 60;
        config.monitoring.enabled = false;
        let state = Arc::new(AppState::new(dispatcher, &config));
        assert!(spawn_stats_reporter(&state).is_none());
    }

    #[test]
    fn wildcard_cors() {
        let headers = cors(&["*"], Some("https://a.example"));
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert!(headers.get(header::VARY).is_none());
    }

    #[test]
    fn listed_origin_is_echoed() {
        let headers = cors(&["https://a.example"], Some("https://a.example"));
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(headers[header::VARY], "Origin");
    }

    #[test]
    fn unlisted_origin_gets_no_allow_origin() {
        let headers = cors(&["https://a.example"], Some("https://evil.example"));
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        let headers = cors(&["https://a.example"], None);
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn client_id_prefers_peer_ip() {
        let mut req = Request::new(Body::empty());
        assert_eq!(client_id(&req), UNKNOWN_CLIENT);

        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_id(&req), "10.1.2.3");
    }

    #[test]
    fn rate_limited_response_headers() {
        let resp = rate_limited(10, 42);
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "42");
        assert_eq!(resp.headers()[X_RATELIMIT_REMAINING], "0");
    }

    #[test]
    fn auth_rejection_challenges_bearer() {
        let resp = auth_rejected(StatusCode::UNAUTHORIZED, "nope");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}

//! Health HTTP Endpoint
//!
//! Small axum server reporting the stream connection and subscription
//! state, plus the Prometheus scrape endpoint.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /health` | JSON [`HealthResponse`]; 503 when disconnected |
//! | `GET /healthz` | `OK` while the process runs |
//! | `GET /readyz` | `READY` once authenticated, 503 before |
//! | `GET /metrics` | Prometheus text exposition |

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::ConnectionState;
use crate::domain::subscription::SubscriptionManager;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Client version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection status.
    pub connection: ConnectionInfo,
    /// Subscription statistics.
    pub subscriptions: SubscriptionInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Streaming data.
    Healthy,
    /// Connecting, reconnecting, or connected with nothing subscribed.
    Degraded,
    /// Not connected.
    Unhealthy,
}

impl HealthStatus {
    /// Derive from the connection state.
    #[must_use]
    pub const fn from_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Subscribed => Self::Healthy,
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Authenticated
            | ConnectionState::Reconnecting => Self::Degraded,
            ConnectionState::Disconnected | ConnectionState::Closed => Self::Unhealthy,
        }
    }
}

/// Feed connection status.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether a session is open.
    pub open: bool,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    /// Desired pairs.
    pub desired: usize,
    /// Pairs confirmed by the feed.
    pub acknowledged: usize,
    /// Desired pairs by stream.
    pub by_stream: BTreeMap<&'static str, usize>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    connection: watch::Receiver<ConnectionState>,
    subscriptions: Arc<SubscriptionManager>,
}

impl HealthServerState {
    /// Report on the given connection and subscriptions.
    #[must_use]
    pub fn new(
        version: String,
        connection: watch::Receiver<ConnectionState>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            connection,
            subscriptions,
        }
    }

    /// Whether the stream can carry data.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(
            *self.connection.borrow(),
            ConnectionState::Authenticated | ConnectionState::Subscribed
        )
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// HTTP server for the health routes.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Serve `state` on `0.0.0.0:port` until `cancel` fires.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind and serve.
    ///
    /// # Errors
    ///
    /// Returns [`HealthServerError::Bind`] if the port is taken and
    /// [`HealthServerError::Serve`] if the server fails while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let port = self.port;
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|source| HealthServerError::Bind { port, source })?;
        tracing::info!(port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::info!(port, "Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let report = health_report(&state);
    let code = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

async fn liveness_handler() -> &'static str {
    "OK"
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (StatusCode::OK, [(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

fn health_report(state: &HealthServerState) -> HealthResponse {
    let connection_state = *state.connection.borrow();
    let stats = state.subscriptions.stats();

    HealthResponse {
        status: HealthStatus::from_state(connection_state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection: ConnectionInfo {
            state: connection_state,
            open: connection_state.is_open(),
        },
        subscriptions: SubscriptionInfo {
            desired: stats.desired,
            acknowledged: stats.acknowledged,
            by_stream: stats
                .desired_by_kind
                .into_iter()
                .map(|(kind, count)| (kind.as_str(), count))
                .collect(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Port could not be bound.
    #[error("cannot bind health port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Server stopped with an I/O error.
    #[error("health server failed: {0}")]
    Serve(#[source] std::io::Error),
}

// =============================================================================
// Tests
// =============================================================================

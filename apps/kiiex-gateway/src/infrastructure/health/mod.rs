//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, venue connection status, and Prometheus
//! metrics. Used by container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (venue connection up)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::VenueTransport;
use crate::application::services::ReconciliationTracker;
use crate::domain::instruments::InstrumentDirectory;
use crate::domain::venue::ConnectionState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Venue connection.
    pub venue: VenueStatus,
    /// Reconciliation state.
    pub orders: OrdersStatus,
    /// Mapped instruments.
    pub instruments: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Venue connected.
    Healthy,
    /// Venue connection being re-established.
    Degraded,
    /// Venue unreachable.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting => Self::Degraded,
            ConnectionState::Disconnected => Self::Unhealthy,
        }
    }
}

/// Venue connection status.
#[derive(Debug, Clone, Serialize)]
pub struct VenueStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether requests can be sent.
    pub connected: bool,
}

/// Reconciliation status.
#[derive(Debug, Clone, Serialize)]
pub struct OrdersStatus {
    /// Orders awaiting a terminal state.
    pub tracked: usize,
    /// Poll interval in seconds.
    pub poll_interval_secs: u64,
    /// Completion time of the last poll.
    pub last_poll: Option<DateTime<Utc>>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    transport: Arc<dyn VenueTransport>,
    tracker: Arc<ReconciliationTracker>,
    instruments: Arc<InstrumentDirectory>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        transport: Arc<dyn VenueTransport>,
        tracker: Arc<ReconciliationTracker>,
        instruments: Arc<InstrumentDirectory>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            transport,
            tracker,
            instruments,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by the health server.
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
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
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.transport.state() == ConnectionState::Connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection = state.transport.state();

    HealthResponse {
        status: connection.into(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        venue: VenueStatus {
            state: connection,
            connected: connection == ConnectionState::Connected,
        },
        orders: OrdersStatus {
            tracked: state.tracker.trade_count(),
            poll_interval_secs: state.tracker.poll_interval().as_secs(),
            last_poll: state.tracker.last_poll().map(|poll| poll.completed_at),
        },
        instruments: state.instruments.len(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::MockOrderStatusQuery;
    use crate::application::ports::testing::RecordingTransport;
    use crate::application::services::DEFAULT_POLL_INTERVAL;
    use crate::domain::events::OrderSubmitted;
    use crate::domain::order::TradeInfo;
    use crate::infrastructure::eventbus::EventBus;

    fn state(transport: Arc<RecordingTransport>) -> Arc<HealthServerState> {
        let tracker = ReconciliationTracker::new(
            Arc::new(MockOrderStatusQuery::new()),
            Arc::new(EventBus::default()),
            DEFAULT_POLL_INTERVAL,
        );
        tracker.handle_event(
            &OrderSubmitted {
                trade_info: TradeInfo {
                    oms_id: 1,
                    account_id: 9,
                    order_id: 42,
                },
                order_id: "cl-42".to_string(),
            }
            .into(),
        );
        let instruments = Arc::new(InstrumentDirectory::new());
        instruments.add_mapping("BTCUSD", 1);

        Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            transport,
            tracker,
            instruments,
        ))
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connection_state() {
        assert_eq!(
            HealthStatus::from(ConnectionState::Connected),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from(ConnectionState::Connecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from(ConnectionState::Disconnected),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get(state(RecordingTransport::disconnected()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_requires_venue_connection() {
        let transport = RecordingTransport::disconnected();
        let state = state(transport.clone());

        let (status, _) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        transport.set_state(ConnectionState::Connected);
        let (status, body) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn health_reports_connection_and_orders() {
        let (status, body) = get(state(RecordingTransport::connected()), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], "0.1.0");
        assert_eq!(json["venue"]["state"], "connected");
        assert_eq!(json["orders"]["tracked"], 1);
        assert_eq!(json["orders"]["poll_interval_secs"], 300);
        assert!(json["orders"]["last_poll"].is_null());
        assert_eq!(json["instruments"], 1);
    }

    #[tokio::test]
    async fn health_is_unavailable_when_disconnected() {
        let (status, body) = get(state(RecordingTransport::disconnected()), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"unhealthy\""));
    }
}

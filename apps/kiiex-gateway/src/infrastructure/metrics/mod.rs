//! Prometheus Metrics Module
//!
//! Exposes gateway metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Venue**: frames sent and received, parse failures, reconnects
//! - **Orders**: submissions, cancels, failures
//! - **Events**: bus publications and drops
//! - **Reconciliation**: tracked orders and status queries
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::events::EventKind;
use crate::domain::venue::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Venue frames
    describe_counter!(
        "kiiex_gateway_envelopes_received_total",
        "Total frames received from the venue by operation"
    );
    describe_counter!(
        "kiiex_gateway_envelopes_sent_total",
        "Total request frames sent to the venue by operation"
    );
    describe_counter!(
        "kiiex_gateway_parse_failures_total",
        "Total inbound frames dropped because they could not be decoded"
    );

    // Connection
    describe_gauge!(
        "kiiex_gateway_connection_state",
        "Venue connection state (1 = connected)"
    );
    describe_counter!(
        "kiiex_gateway_reconnects_total",
        "Total venue reconnection attempts"
    );

    // Orders
    describe_counter!(
        "kiiex_gateway_orders_submitted_total",
        "Total orders sent to the venue"
    );
    describe_counter!(
        "kiiex_gateway_order_cancels_total",
        "Total cancel requests sent to the venue"
    );
    describe_counter!(
        "kiiex_gateway_order_failures_total",
        "Total order commands that failed before reaching the venue"
    );

    // Event bus
    describe_counter!(
        "kiiex_gateway_events_published_total",
        "Total domain events delivered to subscribers"
    );
    describe_counter!(
        "kiiex_gateway_events_dropped_total",
        "Total domain events dropped because a subscriber queue was full"
    );

    // Reconciliation
    describe_gauge!(
        "kiiex_gateway_tracked_orders",
        "Orders awaiting a terminal state"
    );
    describe_counter!(
        "kiiex_gateway_status_queries_total",
        "Total order status queries issued by reconciliation"
    );

    // Latency
    describe_histogram!(
        "kiiex_gateway_send_seconds",
        "Time to write one request frame to the venue"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for status queries.
#[derive(Debug, Clone, Copy)]
pub enum QueryOutcome {
    /// Request sent.
    Sent,
    /// Request failed.
    Failed,
}

impl QueryOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Record a frame received from the venue.
pub fn record_envelope_received(operation: &str) {
    counter!(
        "kiiex_gateway_envelopes_received_total",
        "operation" => operation.to_ascii_lowercase()
    )
    .increment(1);
}

/// Record a request frame sent to the venue.
pub fn record_envelope_sent(operation: &str, duration: Duration) {
    let operation = operation.to_ascii_lowercase();
    counter!(
        "kiiex_gateway_envelopes_sent_total",
        "operation" => operation.clone()
    )
    .increment(1);
    histogram!(
        "kiiex_gateway_send_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

/// Record an inbound frame that failed to decode.
pub fn record_parse_failure() {
    counter!("kiiex_gateway_parse_failures_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Connected => 1.0,
        ConnectionState::Connecting | ConnectionState::Disconnected => 0.0,
    };
    gauge!("kiiex_gateway_connection_state").set(value);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("kiiex_gateway_reconnects_total").increment(1);
}

/// Record an order sent to the venue.
pub fn record_order_submitted(order_type: &'static str) {
    counter!(
        "kiiex_gateway_orders_submitted_total",
        "order_type" => order_type
    )
    .increment(1);
}

/// Record a cancel request sent to the venue.
pub fn record_order_cancel() {
    counter!("kiiex_gateway_order_cancels_total").increment(1);
}

/// Record an order command that failed.
pub fn record_order_failure(reason: &'static str) {
    counter!(
        "kiiex_gateway_order_failures_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record event deliveries.
pub fn record_event_published(kind: EventKind, subscribers: usize) {
    counter!(
        "kiiex_gateway_events_published_total",
        "event" => kind.as_str()
    )
    .increment(subscribers as u64);
}

/// Record an event dropped for one subscriber.
pub fn record_event_dropped(kind: EventKind) {
    counter!(
        "kiiex_gateway_events_dropped_total",
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Update the tracked order gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_orders(count: usize) {
    gauge!("kiiex_gateway_tracked_orders").set(count as f64);
}

/// Record a reconciliation status query.
pub fn record_status_query(outcome: QueryOutcome) {
    counter!(
        "kiiex_gateway_status_queries_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

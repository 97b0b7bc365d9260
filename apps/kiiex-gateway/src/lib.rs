#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::missing_panics_doc
    )
)]

//! Kiiex Gateway - Order Execution Bridge
//!
//! Bridges the internal trading platform and the Kiiex venue's AlphaPoint
//! WebSocket protocol. Order commands are translated into venue requests
//! over one persistent, multiplexed connection; venue replies are routed by
//! operation name and turned into domain events; in-flight orders are
//! reconciled by polling because the venue does not reliably push every
//! terminal state.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Order vocabulary, venue frames, instruments, events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Venue transport, status query, outbound sink
//!   - `services`: Order processor, reconciliation tracker
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alphapoint`: WebSocket transport and session
//!   - `eventbus`: Typed publish/subscribe with bounded queues
//!   - `commands` / `publisher`: Platform queue boundary
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! order queue -> CommandConsumer -> OrderProcessor -> Session -> VenueClient -> venue
//!
//! venue -> VenueClient -> Session (by operation) -> OrderProcessor -> EventBus
//!                                                                     |
//!                         +-------------------------------------------+
//!                         v                                           v
//!               ReconciliationTracker                          EventPublisher -> sink
//!                         |
//!                         +-- every poll interval --> GetOrderStatus per tracked order
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order types and events with no I/O dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{
    AttemptedCancel, DomainEvent, EventKind, FillArrived, OrderCanceled, OrderSubmitted,
};
pub use domain::instruments::{InstrumentDirectory, InstrumentError, InstrumentId};
pub use domain::order::{
    CancelOrderCommand, OrderType, Side, SubmitOrderCommand, TimeInForce, TradeInfo, VenueAccount,
};
pub use domain::venue::{ConnectionState, Envelope, MessageType, SEQUENCE_STEP};

// Ports and services
pub use application::ports::{
    EnvelopeListener, OrderError, OrderStatusQuery, OutboundMessage, OutboundSink, SinkError,
    TransportError, VenueTransport,
};
pub use application::services::{OrderProcessor, PollSummary, ReconciliationTracker};

// Venue adapters
pub use infrastructure::alphapoint::{
    ReconnectConfig, Session, VenueClient, VenueClientConfig, VenueCredentials,
};

// Event bus
pub use infrastructure::eventbus::{EventBus, EventBusConfig, SharedEventBus};

// Queue boundary
pub use infrastructure::commands::{CommandConsumer, Delivery};
pub use infrastructure::publisher::{EventPublisher, TracingSink};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

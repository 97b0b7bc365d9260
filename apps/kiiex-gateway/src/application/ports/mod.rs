//! Port Interfaces
//!
//! Contracts the application services depend on. Infrastructure adapters
//! implement them; tests substitute recording doubles.
//!
//! ## Driven Ports (Outbound)
//!
//! - `VenueTransport`: persistent venue connection
//! - `OutboundSink`: delivery of domain events to the platform
//!
//! ## Driver Ports (Inbound)
//!
//! - `OrderStatusQuery`: venue status lookup used by reconciliation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::order::TradeInfo;
use crate::domain::venue::{ConnectionState, Envelope};

// =============================================================================
// Venue Transport
// =============================================================================

/// Observer invoked for every inbound frame.
pub type EnvelopeListener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A send was attempted while the connection is down.
    #[error("not connected")]
    NotConnected,

    /// Connecting or the handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// An operation did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The transport has been closed for good.
    #[error("transport closed")]
    Closed,
}

/// Persistent, multiplexed connection to the venue.
#[async_trait]
pub trait VenueTransport: Send + Sync {
    /// Send a request frame and return its sequence number.
    ///
    /// # Errors
    ///
    /// `NotConnected` unless the connection is up; otherwise whatever the
    /// write produced.
    async fn send(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<i64, TransportError>;

    /// Register an observer for inbound frames.
    fn add_listener(&self, listener: EnvelopeListener);

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

// =============================================================================
// Order Status Query
// =============================================================================

/// Errors from order operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// The command's symbol is not in the instrument directory.
    #[error("unknown instrument pair: {0}")]
    UnknownInstrument(String),

    /// The cancel target is not a numeric venue id.
    #[error("invalid order id: {0}")]
    InvalidOrderId(String),

    /// The request could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Venue status lookup for a tracked order.
///
/// The answer arrives asynchronously as a venue response; the call only
/// reports whether the request went out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStatusQuery: Send + Sync {
    /// Request the venue status of one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent.
    async fn get_trade_status(&self, trade_info: &TradeInfo) -> Result<(), OrderError>;
}

// =============================================================================
// Outbound Sink
// =============================================================================

/// One message bound for the platform's outbound exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Routing key.
    pub routing_key: &'static str,
    /// JSON body.
    pub body: String,
    /// Message priority, when the route uses one.
    pub priority: Option<u8>,
}

/// Sink failures.
#[derive(Debug, thiserror::Error)]
#[error("outbound delivery failed: {0}")]
pub struct SinkError(pub String);

/// Delivery of domain events to the platform.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message was not accepted.
    async fn deliver(&self, message: OutboundMessage) -> Result<(), SinkError>;
}

#[cfg(test)]
pub mod testing;

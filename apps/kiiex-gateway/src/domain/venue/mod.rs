//! Venue Frame Types
//!
//! AlphaPoint wraps every message in a four-field frame:
//!
//! ```json
//! {"m":0,"i":2,"n":"SendOrder","o":"{\"InstrumentId\":1,...}"}
//! ```
//!
//! `o` is a JSON document encoded as a string, not a nested object. The
//! payload is kept in that encoded form so the bytes received are exactly
//! the bytes handed to response handlers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Amount the request sequence advances per outbound frame.
///
/// The complementary parity is left to venue-initiated messages.
pub const SEQUENCE_STEP: i64 = 2;

// =============================================================================
// Message Type
// =============================================================================

/// Frame message type (`m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    /// Client request.
    Request,
    /// Reply to a request.
    Response,
    /// Subscription request.
    Subscribe,
    /// Venue-initiated push.
    Event,
    /// Subscription removal.
    Unsubscribe,
    /// Venue error.
    Error,
}

impl MessageType {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::Response => 1,
            Self::Subscribe => 2,
            Self::Event => 3,
            Self::Unsubscribe => 4,
            Self::Error => 5,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::Subscribe),
            3 => Ok(Self::Event),
            4 => Ok(Self::Unsubscribe),
            5 => Ok(Self::Error),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// One venue frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "m")]
    pub message_type: MessageType,
    /// Sequence number.
    #[serde(rename = "i")]
    pub sequence: i64,
    /// Operation name, e.g. `SendOrder`.
    #[serde(rename = "n")]
    pub operation: String,
    /// JSON-encoded payload.
    #[serde(rename = "o", default)]
    pub payload: String,
}

impl Envelope {
    /// Build a request frame with an already-encoded payload.
    #[must_use]
    pub fn request(sequence: i64, operation: impl Into<String>, payload: String) -> Self {
        Self {
            message_type: MessageType::Request,
            sequence,
            operation: operation.into(),
            payload,
        }
    }

    /// Decode the nested payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload does not match `T`.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// Operation name normalized for handler lookup.
    #[must_use]
    pub fn operation_key(&self) -> String {
        self.operation.to_ascii_lowercase()
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// State of the venue connection, owned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Ready to send.
    Connected,
}

impl ConnectionState {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

//! AlphaPoint WebSocket Adapters
//!
//! Client side of the Kiiex venue API:
//!
//! - **Client**: connection, sequencing, reconnection
//! - **Session**: credentials and per-operation response routing
//! - **Messages**: request and response payloads

pub mod auth;
pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod session;

pub use auth::{CredentialsError, VenueCredentials};
pub use client::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_VENUE_URL, DEFAULT_WRITE_TIMEOUT, VenueClient,
    VenueClientConfig,
};
pub use codec::{CodecError, EnvelopeCodec};
pub use messages::*;
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig, ReconnectPolicy};
pub use session::{ResponseHandler, Session};

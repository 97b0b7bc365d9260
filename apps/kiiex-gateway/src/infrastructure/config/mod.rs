//! Configuration Module
//!
//! Configuration loading for the gateway service.

mod settings;

pub use settings::{ConfigError, GatewayConfig, ProcessingSettings, ServerSettings, VenueSettings};

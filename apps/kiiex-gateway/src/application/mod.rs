//! Application Layer - Use cases and port definitions.
//!
//! The order processor and reconciliation tracker live here, along with the
//! traits they use to reach the venue and the outbound publisher.

/// Port interfaces for the venue connection and outbound publication.
pub mod ports;

/// Order processing and reconciliation services.
pub mod services;

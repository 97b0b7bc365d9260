//! Domain Layer - Core order types and business rules.
//!
//! Pure types for orders, venue frames, instruments and the events that
//! flow between the processor and the reconciliation tracker. Nothing in
//! here touches the network.

/// Order vocabulary: sides, order types, time-in-force, commands.
pub mod order;

/// Domain events published on the in-process bus.
pub mod events;

/// Symbol to venue instrument identifier directory.
pub mod instruments;

/// Venue wire frame and connection state.
pub mod venue;

//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// AlphaPoint WebSocket client, session and wire messages.
pub mod alphapoint;

/// In-process domain event bus.
pub mod eventbus;

/// Platform order command intake.
pub mod commands;

/// Outbound publication of fills and cancels.
pub mod publisher;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

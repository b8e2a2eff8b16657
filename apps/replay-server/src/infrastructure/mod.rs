//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the servers and process wiring.

/// Subscriber fan-out for the replay topics.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Control API and WebSocket topics.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Session document stores.
pub mod store;

/// OpenTelemetry tracing integration.
pub mod telemetry;

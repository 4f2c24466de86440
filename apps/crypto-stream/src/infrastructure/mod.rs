//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Alpaca crypto stream adapters (transport, codec, supervisor).
pub mod alpaca;

/// Settings and credential loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Operator-facing event handlers.
pub mod presentation;

/// OpenTelemetry tracing integration.
pub mod telemetry;

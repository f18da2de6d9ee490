//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Intrinio adapters (token exchange, WebSocket, codecs, protocols).
pub mod intrinio;

/// Configuration and dependency injection.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging setup.
pub mod telemetry;

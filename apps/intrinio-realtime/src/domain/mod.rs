//! Domain Layer - Core feed types and business logic.
//!
//! This layer contains the core domain types for market data streaming
//! with no I/O. Everything here is plain Rust and unit-testable in isolation.

/// Connection lifecycle states.
pub mod connection;

/// Market data types (trades, quotes, decoded events).
pub mod streaming;

/// Channel subscription tracking and reconciliation.
pub mod subscription;

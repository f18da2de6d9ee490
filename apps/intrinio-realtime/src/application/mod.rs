//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the connection supervisor, the ingestion pipeline
//! and the port interfaces that define how they interact with the network.

/// Port interfaces for external systems (transport, token exchange, codecs).
pub mod ports;

/// Application services: supervisor, pipeline, self-heal, client handle.
pub mod services;

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Intrinio Realtime - Streaming Market Data Client
//!
//! A client that keeps a persistent WebSocket session to one of Intrinio's
//! realtime equities feeds, decodes binary or JSON frames into trades and
//! quotes on a worker pool, and hands them to user callbacks. Lost sockets
//! are re-established on an escalating-then-flat backoff and every desired
//! channel is re-joined.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core feed types with no I/O
//!   - `streaming`: Trades, quotes and decoded events
//!   - `subscription`: Desired vs. joined channel reconciliation
//!   - `connection`: Connection lifecycle states
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Token exchange, socket transport, frame codecs
//!   - `services`: Supervisor, self-heal scheduler, ingestion pipeline, client
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `intrinio`: HTTP token provider, WebSocket transport, codecs, protocols
//!   - `config`: Configuration and dependency injection
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//!                   ┌────────────┐  frames  ┌─────────┐  events  ┌───────────┐
//! Intrinio WS ─────►│ Supervisor │─────────►│  Queue  │─────────►│ Workers   │──► on_trade
//!      ▲            └────────────┘          └─────────┘          │ (decode)  │──► on_quote
//!      │ join/leave        │                                     └───────────┘
//!      └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use intrinio_realtime::{ClientConfig, Credentials, Provider, build_client};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new(Credentials::api_key("key"), Provider::Realtime)
//!     .with_channels(["AAPL", "MSFT"]);
//! let client = build_client(&config)?;
//! client.on_trade(|trade| println!("{trade:?}"));
//! client.connect()?;
//! # client.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::streaming::{DomainEvent, Quote, QuoteType, SubProvider, Trade};
pub use domain::subscription::{Channel, ChannelSnapshot, SubscriptionError};

// Client
pub use application::services::{
    BackoffSchedule, Client, ClientError, FeedError, PipelineSettings, SupervisorPorts,
    SupervisorSettings,
};

// Configuration
pub use infrastructure::config::{ClientConfig, ConfigError, Provider, build_client};
pub use infrastructure::intrinio::{Credentials, WireVersion};

// Metrics
pub use infrastructure::metrics::{get_metrics_handle, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{LoggerSetting, init as init_telemetry, without_client_events};

//! Connection Lifecycle State
//!
//! The states a feed connection moves through. Transitions are driven
//! exclusively by the connection supervisor.

use std::fmt;

/// Current state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    #[default]
    Disconnected,
    /// Token fetch or socket open in flight.
    Connecting,
    /// Socket open; channels reconciled.
    Open,
    /// Waiting for the self-heal timer after a failure.
    SelfHealing,
    /// `disconnect()` in progress.
    Closing,
    /// Credentials rejected. No automatic retries happen from here.
    Fatal,
}

impl ConnectionState {
    /// Whether the socket is open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the connection gave up because of rejected credentials.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }

    /// Whether an explicit `connect()` should start a new attempt.
    #[must_use]
    pub const fn accepts_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::SelfHealing)
    }

    /// Numeric code used for the connection state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Open => 2.0,
            Self::SelfHealing => 3.0,
            Self::Closing => 4.0,
            Self::Fatal => 5.0,
        }
    }

    /// Lower-case name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::SelfHealing => "self_healing",
            Self::Closing => "closing",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Phoenix Channel Message Types
//!
//! Wire format types for the JSON-event providers. These providers speak the
//! Phoenix channel protocol: every frame is an envelope with a topic, an
//! event name, a payload and a reference.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"topic":"iex:securities:AAPL","event":"quote","payload":{"type":"last","timestamp":1493409509.3932788,"ticker":"AAPL","size":100,"price":143.73},"ref":null}
//! {"topic":"iex:securities:AAPL","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":null}
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// Envelope
// =============================================================================

/// Inbound Phoenix envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhoenixMessage {
    /// Channel topic.
    pub topic: String,
    /// Event name (`quote`, `trade`, `phx_reply`, ...).
    pub event: String,
    /// Event-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Client reference echoed by the server.
    #[serde(rename = "ref", default)]
    pub reference: Option<serde_json::Value>,
}

/// Outbound Phoenix control envelope (join, leave, heartbeat).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhoenixControl {
    /// Channel topic.
    pub topic: String,
    /// Event name.
    pub event: &'static str,
    /// Always an empty object.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Always `null`.
    #[serde(rename = "ref")]
    pub reference: Option<u64>,
}

impl PhoenixControl {
    /// Join a topic.
    #[must_use]
    pub fn join(topic: impl Into<String>) -> Self {
        Self::new(topic, "phx_join")
    }

    /// Leave a topic.
    #[must_use]
    pub fn leave(topic: impl Into<String>) -> Self {
        Self::new(topic, "phx_leave")
    }

    /// Socket-level keep-alive.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new("phoenix", "heartbeat")
    }

    fn new(topic: impl Into<String>, event: &'static str) -> Self {
        Self {
            topic: topic.into(),
            event,
            payload: serde_json::Map::new(),
            reference: None,
        }
    }

    /// Serialize to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// `quote` event payload. `type` is `last` for trades, `ask`/`bid` for quotes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuotePayload {
    /// `last`, `ask` or `bid`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Seconds since the epoch, fractional.
    pub timestamp: f64,
    /// Ticker symbol.
    pub ticker: String,
    /// Size in shares.
    pub size: f64,
    /// Price.
    pub price: f64,
}

/// `trade` event payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradePayload {
    /// Ticker symbol.
    #[serde(alias = "ticker")]
    pub symbol: String,
    /// Price.
    pub price: f64,
    /// Size in shares.
    pub size: f64,
    /// Seconds since the epoch, fractional.
    pub timestamp: f64,
    /// Cumulative volume, if provided.
    #[serde(default)]
    pub total_volume: u32,
}

/// `phx_reply` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyPayload {
    /// `ok` or `error`.
    #[serde(default)]
    pub status: Option<String>,
}

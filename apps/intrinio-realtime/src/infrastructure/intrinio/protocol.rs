//! Provider Protocols
//!
//! [`FeedProtocol`] implementations for the two provider families:
//!
//! - [`BinaryProtocol`]: binary control frames, binary multi-record data.
//! - [`PhoenixProtocol`]: Phoenix JSON control frames and data.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::application::ports::{FeedProtocol, FrameCodec, Heartbeat, OutboundFrame};
use crate::domain::subscription::Channel;

use super::codec::{BinaryCodec, JsonCodec, WireVersion};
use super::messages::PhoenixControl;

/// Default keep-alive interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

const JOIN: u8 = 0x4A;
const LEAVE: u8 = 0x4C;
const FIREHOSE: &str = "$FIREHOSE";

// =============================================================================
// Binary Protocol
// =============================================================================

/// Binary control frames for the realtime equities providers.
#[derive(Debug, Clone)]
pub struct BinaryProtocol {
    codec: Arc<BinaryCodec>,
    heartbeat_interval: Duration,
}

impl BinaryProtocol {
    /// Create a protocol reading the given wire version.
    #[must_use]
    pub fn new(version: WireVersion) -> Self {
        Self {
            codec: Arc::new(BinaryCodec::new(version)),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the keep-alive interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    fn wire_name(channel: &Channel) -> &str {
        if channel.is_lobby() {
            FIREHOSE
        } else {
            channel.as_str()
        }
    }
}

impl FeedProtocol for BinaryProtocol {
    fn codec(&self) -> Arc<dyn FrameCodec> {
        self.codec.clone()
    }

    fn join_frame(&self, channel: &Channel, trades_only: bool) -> OutboundFrame {
        let name = Self::wire_name(channel);
        let mut buf = BytesMut::with_capacity(2 + name.len());
        buf.put_u8(JOIN);
        buf.put_u8(u8::from(trades_only));
        buf.put_slice(name.as_bytes());
        OutboundFrame::Binary(buf.freeze())
    }

    fn leave_frame(&self, channel: &Channel, _trades_only: bool) -> OutboundFrame {
        let name = Self::wire_name(channel);
        let mut buf = BytesMut::with_capacity(1 + name.len());
        buf.put_u8(LEAVE);
        buf.put_slice(name.as_bytes());
        OutboundFrame::Binary(buf.freeze())
    }

    fn heartbeat(&self) -> Option<Heartbeat> {
        Some(Heartbeat {
            interval: self.heartbeat_interval,
            frame: OutboundFrame::Text(String::new()),
        })
    }
}

// =============================================================================
// Phoenix Protocol
// =============================================================================

/// Phoenix JSON control frames for the IEX provider.
#[derive(Debug, Clone)]
pub struct PhoenixProtocol {
    codec: Arc<JsonCodec>,
    heartbeat_interval: Duration,
}

impl Default for PhoenixProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl PhoenixProtocol {
    /// Create the protocol with the default heartbeat.
    #[must_use]
    pub fn new() -> Self {
        Self {
            codec: Arc::new(JsonCodec::new()),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the keep-alive interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Topic for a channel.
    #[must_use]
    pub fn topic(channel: &Channel, trades_only: bool) -> String {
        match (channel.is_lobby(), trades_only) {
            (true, true) => "iex:lobby:last_price".to_string(),
            (true, false) => "iex:lobby".to_string(),
            (false, _) => format!("iex:securities:{}", channel.as_str()),
        }
    }

    fn text(control: &PhoenixControl) -> OutboundFrame {
        // Serializing a struct of strings and an empty map cannot fail.
        OutboundFrame::Text(control.to_json().unwrap_or_default())
    }
}

impl FeedProtocol for PhoenixProtocol {
    fn codec(&self) -> Arc<dyn FrameCodec> {
        self.codec.clone()
    }

    fn join_frame(&self, channel: &Channel, trades_only: bool) -> OutboundFrame {
        Self::text(&PhoenixControl::join(Self::topic(channel, trades_only)))
    }

    fn leave_frame(&self, channel: &Channel, trades_only: bool) -> OutboundFrame {
        Self::text(&PhoenixControl::leave(Self::topic(channel, trades_only)))
    }

    fn heartbeat(&self) -> Option<Heartbeat> {
        Some(Heartbeat {
            interval: self.heartbeat_interval,
            frame: Self::text(&PhoenixControl::heartbeat()),
        })
    }
}

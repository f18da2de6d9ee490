//! Wire codec and protocol strategy ports.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::domain::streaming::DomainEvent;
use crate::domain::subscription::Channel;

/// Why a frame could not be decoded. Only the offending frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A read would run past the end of the frame or record.
    #[error("truncated frame: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Cursor position of the failed read.
        offset: usize,
        /// Bytes the read needed.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// The frame had no bytes at all.
    #[error("empty frame")]
    EmptyFrame,

    /// A record declared a length too short to hold its own header.
    #[error("record at offset {offset} declares invalid length {length}")]
    InvalidRecordLength {
        /// Record start.
        offset: usize,
        /// Declared length.
        length: usize,
    },

    /// A message type this wire version cannot skip.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// Symbol or condition bytes were not ASCII.
    #[error("invalid {field} bytes at offset {offset}")]
    InvalidText {
        /// Field being decoded.
        field: &'static str,
        /// Field start.
        offset: usize,
    },

    /// JSON frame could not be parsed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON frame had an unexpected shape.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// Decodes a raw frame into domain events.
///
/// Implementations are pure: no shared mutable state, safe to call from any
/// number of worker threads at once.
pub trait FrameCodec: Send + Sync + fmt::Debug {
    /// Decode one frame into its records, in wire order.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if any part of the frame is malformed; no
    /// events from that frame are returned.
    fn decode(&self, frame: &[u8]) -> Result<Vec<DomainEvent>, DecodeError>;
}

/// A frame the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Binary websocket frame.
    Binary(Bytes),
    /// Text websocket frame.
    Text(String),
}

/// Keep-alive a protocol requires while the socket is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Time between keep-alives.
    pub interval: Duration,
    /// Payload sent every interval.
    pub frame: OutboundFrame,
}

/// Everything that differs between provider families on an open socket.
///
/// One implementation is chosen when the client is built and used for the
/// lifetime of the client.
pub trait FeedProtocol: Send + Sync + fmt::Debug {
    /// Decoder for inbound frames.
    fn codec(&self) -> Arc<dyn FrameCodec>;

    /// Control frame that starts delivery of `channel`.
    fn join_frame(&self, channel: &Channel, trades_only: bool) -> OutboundFrame;

    /// Control frame that stops delivery of `channel`. `trades_only` is the
    /// flag the channel was joined with.
    fn leave_frame(&self, channel: &Channel, trades_only: bool) -> OutboundFrame;

    /// Keep-alive to run while open, if the protocol needs one.
    fn heartbeat(&self) -> Option<Heartbeat>;
}

//! Socket transport port.
//!
//! A transport opens one socket per [`SocketRequest`]. Completion of
//! [`Transport::open`] is the "opened" signal; everything afterwards is
//! delivered as [`TransportEvent`]s on the session's event channel, which
//! the transport must never block on.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::codec::OutboundFrame;

/// An opaque frame as delivered by the socket. Owned by whoever holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(Bytes);

impl RawFrame {
    /// Wrap a received payload.
    #[must_use]
    pub const fn new(payload: Bytes) -> Self {
        Self(payload)
    }

    /// Payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(payload: Vec<u8>) -> Self {
        Self(Bytes::from(payload))
    }
}

impl From<Bytes> for RawFrame {
    fn from(payload: Bytes) -> Self {
        Self(payload)
    }
}

/// Where and how to open the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRequest {
    /// Full socket URL including the token.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

/// Socket URL prefix and headers; the token is appended per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEndpoint {
    url_prefix: String,
    headers: Vec<(String, String)>,
}

impl SocketEndpoint {
    /// Create an endpoint. `url_prefix` must end where the token goes.
    #[must_use]
    pub fn new(url_prefix: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            headers,
        }
    }

    /// Request for one connection attempt. The token is percent-encoded.
    #[must_use]
    pub fn request(&self, token: &str) -> SocketRequest {
        SocketRequest {
            url: format!("{}{}", self.url_prefix, urlencoding::encode(token)),
            headers: self.headers.clone(),
        }
    }
}

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data frame arrived.
    Message(RawFrame),
    /// The socket closed.
    Closed(Option<String>),
    /// The socket failed.
    Error(String),
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("failed to open socket: {0}")]
    Open(String),

    /// The socket is no longer accepting frames.
    #[error("connection closed")]
    Closed,
}

/// Handle to one open socket.
pub trait Connection: Send + Sync {
    /// Queue a frame for sending. Must not block.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the socket is gone.
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Close the socket. Calling it more than once is a no-op.
    fn close(&self);
}

/// A freshly opened socket and its event stream.
pub struct TransportSession {
    /// Send/close handle.
    pub connection: Arc<dyn Connection>,
    /// Events from the socket, in arrival order.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession").finish_non_exhaustive()
    }
}

/// Opens sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket. Resolves once the handshake has completed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the handshake fails.
    async fn open(&self, request: SocketRequest) -> Result<TransportSession, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_token() {
        let endpoint = SocketEndpoint::new(
            "wss://example.test/socket/websocket?vsn=1.0.0&token=",
            vec![("Client-Information".to_string(), "test".to_string())],
        );
        let request = endpoint.request("abc");
        assert_eq!(
            request.url,
            "wss://example.test/socket/websocket?vsn=1.0.0&token=abc"
        );
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn endpoint_escapes_reserved_token_characters() {
        let endpoint = SocketEndpoint::new("wss://example.test/socket?token=", Vec::new());
        let request = endpoint.request("a+b/c=d&e f");
        assert_eq!(
            request.url,
            "wss://example.test/socket?token=a%2Bb%2Fc%3Dd%26e%20f"
        );
    }

    #[test]
    fn raw_frame_owns_payload() {
        let frame = RawFrame::from(vec![1, 2, 3]);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);
        assert!(!frame.is_empty());
    }
}

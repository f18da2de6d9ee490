//! WebSocket Transport
//!
//! [`Transport`] adapter over `tokio-tungstenite`. Each open socket gets a
//! reader task that forwards frames as [`TransportEvent`]s and a writer task
//! that drains outbound frames. Neither task ever waits on the consumer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    Connection, OutboundFrame, RawFrame, SocketRequest, Transport, TransportError,
    TransportEvent, TransportSession,
};

// =============================================================================
// Transport
// =============================================================================

/// Opens WebSocket connections.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a transport.
    ///
    /// Installs the `ring` rustls provider if no process default exists yet.
    #[must_use]
    pub fn new() -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, request: SocketRequest) -> Result<TransportSession, TransportError> {
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Open(e.to_string()))?;

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Open(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| TransportError::Open(e.to_string()))?;
            ws_request.headers_mut().insert(name, value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        // Writer
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            tracing::debug!(error = %e, "WebSocket write failed");
                            writer_cancel.cancel();
                            break;
                        }
                    }
                }
            }
        });

        // Reader
        let reader_cancel = cancel.clone();
        let pong_tx = outbound_tx.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    () = reader_cancel.cancelled() => {
                        let _ = event_tx.send(TransportEvent::Closed(None));
                        break;
                    }
                    msg = read.next() => msg,
                };

                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let _ = event_tx.send(TransportEvent::Message(RawFrame::new(data)));
                    }
                    Some(Ok(Message::Text(text))) => {
                        let payload = Bytes::copy_from_slice(text.as_str().as_bytes());
                        let _ = event_tx.send(TransportEvent::Message(RawFrame::new(payload)));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = pong_tx.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        tracing::info!(reason = ?reason, "Server sent close frame");
                        let _ = event_tx.send(TransportEvent::Closed(reason));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Pong and raw frames carry nothing for us
                    }
                    Some(Err(e)) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        let _ = event_tx.send(TransportEvent::Closed(None));
                        break;
                    }
                }
            }
            reader_cancel.cancel();
        });

        let connection = Arc::new(WebSocketConnection {
            outbound: outbound_tx,
            cancel,
        });

        Ok(TransportSession {
            connection,
            events: event_rx,
        })
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Send/close handle for one WebSocket.
#[derive(Debug)]
pub struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl Connection for WebSocketConnection {
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let message = match frame {
            OutboundFrame::Binary(bytes) => Message::Binary(bytes),
            OutboundFrame::Text(text) => Message::Text(text.into()),
        };
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_fails_for_unreachable_address() {
        let transport = WebSocketTransport::new();
        let result = transport
            .open(SocketRequest {
                url: "ws://127.0.0.1:1/socket/websocket".to_string(),
                headers: vec![],
            })
            .await;
        assert!(matches!(result, Err(TransportError::Open(_))));
    }

    #[tokio::test]
    async fn open_rejects_invalid_header() {
        let transport = WebSocketTransport::new();
        let result = transport
            .open(SocketRequest {
                url: "ws://127.0.0.1:1/socket/websocket".to_string(),
                headers: vec![("bad header".to_string(), "v".to_string())],
            })
            .await;
        assert!(matches!(result, Err(TransportError::Open(_))));
    }

    #[test]
    fn closed_connection_refuses_frames() {
        let (outbound, _rx) = mpsc::unbounded_channel();
        let connection = WebSocketConnection {
            outbound,
            cancel: CancellationToken::new(),
        };
        assert!(connection.send(OutboundFrame::Text(String::new())).is_ok());

        connection.close();
        connection.close();
        assert_eq!(
            connection.send(OutboundFrame::Text(String::new())),
            Err(TransportError::Closed)
        );
    }
}

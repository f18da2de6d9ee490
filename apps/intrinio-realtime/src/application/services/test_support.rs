//! In-memory token provider and transport for service tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{
    AuthError, Connection, OutboundFrame, SocketEndpoint, SocketRequest, TokenProvider, Transport,
    TransportError, TransportEvent, TransportSession,
};
use crate::infrastructure::intrinio::{BinaryProtocol, WireVersion};

use super::supervisor::SupervisorPorts;

/// Hands out `"token"` unless a scripted failure is queued.
#[derive(Default)]
pub struct FakeTokens {
    pub failures: Mutex<VecDeque<AuthError>>,
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        match self.failures.lock().pop_front() {
            Some(e) => Err(e),
            None => Ok("token".to_string()),
        }
    }
}

#[derive(Default)]
pub struct FakeConnection {
    pub sent: Mutex<Vec<OutboundFrame>>,
}

impl Connection for FakeConnection {
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self) {}
}

/// Opens in-memory sockets and keeps their event senders.
#[derive(Default)]
pub struct FakeTransport {
    pub requests: Mutex<Vec<SocketRequest>>,
    pub sockets: Mutex<Vec<(Arc<FakeConnection>, mpsc::UnboundedSender<TransportEvent>)>>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, request: SocketRequest) -> Result<TransportSession, TransportError> {
        self.requests.lock().push(request);
        let connection = Arc::new(FakeConnection::default());
        let (tx, events) = mpsc::unbounded_channel();
        self.sockets.lock().push((connection.clone(), tx));
        Ok(TransportSession { connection, events })
    }
}

pub fn ports() -> SupervisorPorts {
    fake_ports().0
}

pub fn fake_ports() -> (SupervisorPorts, Arc<FakeTokens>, Arc<FakeTransport>) {
    let tokens = Arc::new(FakeTokens::default());
    let transport = Arc::new(FakeTransport::default());
    let ports = SupervisorPorts {
        tokens: tokens.clone(),
        transport: transport.clone(),
        protocol: Arc::new(BinaryProtocol::new(WireVersion::V1)),
        endpoint: SocketEndpoint::new("ws://localhost/socket?token=", Vec::new()),
    };
    (ports, tokens, transport)
}

//! Connection Supervisor
//!
//! The single task that owns the connection state machine, the channel
//! registry, the self-heal scheduler and the ingestion pipeline. The public
//! [`Client`](super::Client) talks to it only through [`Command`]s.
//!
//! # State Machine
//!
//! ```text
//!                 connect                 open ok
//! Disconnected ───────────► Connecting ───────────► Open
//!      ▲                     │      │                 │
//!      │         401         │      │ other failure   │ close / error
//!      │     ┌───────────────┘      ▼                 │
//!      │     ▼                 SelfHealing ◄──────────┘
//!      │   Fatal                    │ timer fires
//!      │     │                      └──► Connecting
//!      │     │ disconnect
//!      └── Closing ◄── (any state) ──┘
//! ```
//!
//! # Attempts
//!
//! Token fetch and socket open run in a spawned task so the supervisor keeps
//! serving commands meanwhile. Every attempt carries a generation number;
//! outcomes from a superseded generation are discarded and any socket they
//! opened is closed.

use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AuthError, Connection, FeedProtocol, SocketEndpoint, TokenProvider, Transport, TransportError,
    TransportEvent, TransportSession,
};
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::{Channel, ChannelRegistry, ChannelSnapshot, ControlAction};
use crate::infrastructure::metrics;

use super::callbacks::{FeedError, Handlers};
use super::heartbeat::HeartbeatManager;
use super::pipeline::{IngestionPipeline, PipelineSettings};
use super::self_heal::{BackoffSchedule, SelfHealScheduler};

// =============================================================================
// Settings and Ports
// =============================================================================

/// Behavioural settings for one client.
#[derive(Debug, Clone, Default)]
pub struct SupervisorSettings {
    /// Channels joined as soon as the first socket opens.
    pub channels: Vec<Channel>,
    /// Request trades only (no quotes) when joining.
    pub trades_only: bool,
    /// Reconnection delays.
    pub backoff: BackoffSchedule,
    /// Worker pool sizing.
    pub pipeline: PipelineSettings,
}

/// Collaborators the supervisor drives.
#[derive(Clone)]
pub struct SupervisorPorts {
    /// Token exchange.
    pub tokens: Arc<dyn TokenProvider>,
    /// Socket transport.
    pub transport: Arc<dyn Transport>,
    /// Provider-specific frames and codec.
    pub protocol: Arc<dyn FeedProtocol>,
    /// Socket URL and headers.
    pub endpoint: SocketEndpoint,
}

impl std::fmt::Debug for SupervisorPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorPorts")
            .field("protocol", &self.protocol)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Requests from the client handle.
#[derive(Debug)]
pub enum Command {
    /// Start connecting.
    Connect,
    /// Tear everything down; the sender is notified when done.
    Disconnect(oneshot::Sender<()>),
    /// Add channels.
    Join(Vec<Channel>),
    /// Remove channels.
    Leave(Vec<Channel>),
    /// Remove every channel.
    LeaveAll,
    /// Report desired and joined channels.
    Snapshot(oneshot::Sender<ChannelSnapshot>),
}

/// Why a connection attempt produced no socket.
#[derive(Debug)]
enum AttemptError {
    Auth(AuthError),
    Transport(TransportError),
    Cancelled,
}

struct AttemptOutcome {
    generation: u64,
    result: Result<TransportSession, AttemptError>,
}

/// The open socket plus its keep-alive.
struct Session {
    connection: Arc<dyn Connection>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    heartbeat: Option<CancellationToken>,
}

impl Session {
    fn close(self) {
        if let Some(heartbeat) = self.heartbeat {
            heartbeat.cancel();
        }
        self.connection.close();
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Owns all mutable client state. Run with [`ConnectionSupervisor::run`].
pub struct ConnectionSupervisor {
    ports: SupervisorPorts,
    pipeline_settings: PipelineSettings,
    registry: ChannelRegistry,
    scheduler: SelfHealScheduler,
    pipeline: Option<IngestionPipeline>,
    handlers: Arc<Handlers>,
    session: Option<Session>,
    attempt: Option<JoinHandle<()>>,
    generation: u64,
    closing: Arc<AtomicBool>,
    state: watch::Sender<ConnectionState>,
    commands: mpsc::UnboundedReceiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<AttemptOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<AttemptOutcome>,
}

impl ConnectionSupervisor {
    /// Create a supervisor in the `Disconnected` state.
    #[must_use]
    pub fn new(
        settings: SupervisorSettings,
        ports: SupervisorPorts,
        handlers: Arc<Handlers>,
        closing: Arc<AtomicBool>,
        state: watch::Sender<ConnectionState>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let mut registry = ChannelRegistry::new(settings.trades_only);
        registry.join(settings.channels);
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        Self {
            ports,
            pipeline_settings: settings.pipeline,
            registry,
            scheduler: SelfHealScheduler::new(settings.backoff, closing.clone()),
            pipeline: None,
            handlers,
            session: None,
            attempt: None,
            generation: 0,
            closing,
            state,
            commands,
            outcomes_tx,
            outcomes_rx,
        }
    }

    /// Serve commands, attempt outcomes, socket events and retry timers until
    /// every client handle is gone, then release everything.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                Some(outcome) = self.outcomes_rx.recv() => {
                    self.handle_outcome(outcome);
                }
                event = next_event(&mut self.session) => {
                    self.handle_transport_event(event);
                }
                () = self.scheduler.expired() => {
                    self.on_retry_timer();
                }
            }
        }

        tracing::debug!("Client dropped, shutting down supervisor");
        self.teardown().await;
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Connection state changed");
            metrics::set_connection_state(next);
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect(done) => {
                self.disconnect().await;
                let _ = done.send(());
            }
            Command::Join(channels) => {
                self.registry.join(channels);
                self.reconcile();
            }
            Command::Leave(channels) => {
                self.registry.leave(&channels);
                self.reconcile();
            }
            Command::LeaveAll => {
                self.registry.leave_all();
                self.reconcile();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn connect(&mut self) {
        let state = self.current_state();
        if state.accepts_connect() {
            self.closing.store(false, Ordering::SeqCst);
            self.start_attempt();
        } else if state.is_fatal() {
            tracing::warn!("Credentials were rejected; disconnect before connecting again");
        } else {
            tracing::debug!(state = %state, "Ignoring connect");
        }
    }

    async fn disconnect(&mut self) {
        tracing::info!("Disconnecting");
        self.closing.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Closing);
        self.registry.clear();
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Cancel the in-flight attempt, close the socket, disarm the timer and
    /// stop the workers.
    async fn teardown(&mut self) {
        self.generation += 1;
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
        self.close_session();
        self.scheduler.cancel();
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
    }

    // -------------------------------------------------------------------------
    // Attempts
    // -------------------------------------------------------------------------

    fn start_attempt(&mut self) {
        self.scheduler.cancel();

        if self.pipeline.is_none() {
            match IngestionPipeline::start(
                &self.pipeline_settings,
                self.ports.protocol.codec(),
                self.handlers.clone(),
            ) {
                Ok(pipeline) => self.pipeline = Some(pipeline),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start ingestion pipeline");
                    self.set_state(ConnectionState::SelfHealing);
                    self.schedule_retry();
                    return;
                }
            }
        }

        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(generation, "Connecting");

        let tokens = self.ports.tokens.clone();
        let transport = self.ports.transport.clone();
        let endpoint = self.ports.endpoint.clone();
        let closing = self.closing.clone();
        let outcomes = self.outcomes_tx.clone();

        self.attempt = Some(tokio::spawn(async move {
            let result = attempt(tokens.as_ref(), transport.as_ref(), &endpoint, &closing).await;
            let _ = outcomes.send(AttemptOutcome { generation, result });
        }));
    }

    fn handle_outcome(&mut self, outcome: AttemptOutcome) {
        if outcome.generation != self.generation {
            tracing::debug!(generation = outcome.generation, "Discarding stale attempt");
            if let Ok(session) = outcome.result {
                session.connection.close();
            }
            return;
        }
        self.attempt = None;

        match outcome.result {
            Ok(session) => self.on_open(session),
            Err(AttemptError::Auth(e)) if e.is_fatal() => {
                tracing::error!(error = %e, "Token request rejected, giving up");
                self.scheduler.cancel();
                self.set_state(ConnectionState::Fatal);
                self.handlers.report(&FeedError::Auth(e));
            }
            Err(AttemptError::Auth(e)) => {
                tracing::warn!(error = %e, "Token request failed");
                self.handlers.report(&FeedError::Auth(e));
                self.self_heal();
            }
            Err(AttemptError::Transport(e)) => {
                tracing::warn!(error = %e, "Socket open failed");
                self.handlers.report(&FeedError::Transport(e));
                self.self_heal();
            }
            Err(AttemptError::Cancelled) => {
                tracing::debug!("Attempt abandoned while closing");
            }
        }
    }

    fn on_open(&mut self, session: TransportSession) {
        let heartbeat = self.ports.protocol.heartbeat().map(|heartbeat| {
            let cancel = CancellationToken::new();
            let manager =
                HeartbeatManager::new(heartbeat, session.connection.clone(), cancel.clone());
            drop(manager.spawn());
            cancel
        });

        self.session = Some(Session {
            connection: session.connection,
            events: session.events,
            heartbeat,
        });

        self.set_state(ConnectionState::Open);
        self.scheduler.on_connect_success();
        self.reconcile();
    }

    fn on_retry_timer(&mut self) {
        if self.current_state() == ConnectionState::SelfHealing {
            self.start_attempt();
        }
    }

    fn self_heal(&mut self) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        self.set_state(ConnectionState::SelfHealing);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if self.scheduler.schedule().is_some() {
            metrics::record_reconnect_attempt();
        }
    }

    // -------------------------------------------------------------------------
    // Open socket
    // -------------------------------------------------------------------------

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Message(frame)) => {
                metrics::record_frame_received();
                if let Some(pipeline) = &self.pipeline {
                    pipeline.push(frame);
                }
            }
            Some(TransportEvent::Closed(reason)) => {
                let reason = reason.unwrap_or_else(|| "closed".to_string());
                tracing::warn!(reason = %reason, "Socket closed");
                self.on_connection_lost(reason);
            }
            Some(TransportEvent::Error(e)) => {
                tracing::warn!(error = %e, "Socket error");
                self.on_connection_lost(e);
            }
            None => {
                tracing::warn!("Socket event stream ended");
                self.on_connection_lost("event stream ended".to_string());
            }
        }
    }

    fn on_connection_lost(&mut self, reason: String) {
        self.close_session();
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        self.handlers.report(&FeedError::ConnectionLost(reason));
        self.self_heal();
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.registry.reset_joined();
        metrics::set_channels_joined(0);
    }

    fn reconcile(&mut self) {
        if !self.current_state().is_open() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };

        let connection = session.connection.clone();
        let protocol = self.ports.protocol.clone();
        let result = self.registry.reconcile(|action, channel, trades_only| {
            let frame = match action {
                ControlAction::Join => protocol.join_frame(channel, trades_only),
                ControlAction::Leave => protocol.leave_frame(channel, trades_only),
            };
            connection.send(frame)
        });

        if let Err(e) = result {
            tracing::warn!(error = %e, "Control frame not sent, will retry on next open");
        }
        metrics::set_channels_joined(self.registry.joined_count());
    }
}

/// Fetch a token, then open the socket unless the client started closing.
async fn attempt(
    tokens: &dyn TokenProvider,
    transport: &dyn Transport,
    endpoint: &SocketEndpoint,
    closing: &AtomicBool,
) -> Result<TransportSession, AttemptError> {
    let token = tokens.fetch_token().await.map_err(AttemptError::Auth)?;
    if closing.load(Ordering::SeqCst) {
        return Err(AttemptError::Cancelled);
    }
    transport
        .open(endpoint.request(&token))
        .await
        .map_err(AttemptError::Transport)
}

/// Next event of the open socket; pending forever when there is none.
async fn next_event(session: &mut Option<Session>) -> Option<TransportEvent> {
    match session {
        Some(session) => session.events.recv().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use parking_lot::Mutex;

    use crate::application::ports::OutboundFrame;
    use crate::application::services::client::Client;
    use crate::application::services::test_support::fake_ports;

    fn settings(channels: &[&str], backoff_ms: &[u64]) -> SupervisorSettings {
        SupervisorSettings {
            channels: channels.iter().map(|c| Channel::new(*c).unwrap()).collect(),
            trades_only: false,
            backoff: BackoffSchedule::new(
                backoff_ms.iter().copied().map(Duration::from_millis).collect(),
            )
            .unwrap(),
            pipeline: PipelineSettings {
                worker_count: 1,
                queue_capacity: 16,
                shutdown_timeout: Duration::from_secs(1),
            },
        }
    }

    fn join(name: &str) -> OutboundFrame {
        let mut frame = vec![0x4A, 0x00];
        frame.extend_from_slice(name.as_bytes());
        OutboundFrame::Binary(Bytes::from(frame))
    }

    async fn wait_for(client: &Client, state: ConnectionState) {
        let mut changes = client.state_changes();
        tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|s| *s == state))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn connect_opens_socket_and_joins_desired_channels() {
        let (ports, _tokens, transport) = fake_ports();
        let client = Client::new(settings(&["AAPL"], &[0]), ports).unwrap();

        client.connect().unwrap();
        wait_for(&client, ConnectionState::Open).await;
        let snapshot = client.channels().await.unwrap();

        assert_eq!(transport.requests.lock()[0].url, "ws://localhost/socket?token=token");
        let sockets = transport.sockets.lock();
        assert_eq!(*sockets[0].0.sent.lock(), vec![join("AAPL")]);
        assert_eq!(snapshot.joined, vec![Channel::new("AAPL").unwrap()]);
        drop(sockets);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn join_while_open_sends_only_new_channel() {
        let (ports, _tokens, transport) = fake_ports();
        let client = Client::new(settings(&["AAPL"], &[0]), ports).unwrap();
        client.connect().unwrap();
        wait_for(&client, ConnectionState::Open).await;

        client.join(["AAPL", "MSFT"]).unwrap();
        client.leave(["AAPL"]).unwrap();
        client.channels().await.unwrap();

        let sent = transport.sockets.lock()[0].0.sent.lock().clone();
        let leave = OutboundFrame::Binary(Bytes::from_static(b"\x4CAAPL"));
        assert_eq!(sent, vec![join("AAPL"), join("MSFT"), leave]);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn lost_socket_reconnects_and_rejoins() {
        let (ports, _tokens, transport) = fake_ports();
        let client = Client::new(settings(&["AAPL"], &[0]), ports).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        client.on_error(move |e| seen.lock().push(e.to_string()));

        client.connect().unwrap();
        wait_for(&client, ConnectionState::Open).await;

        let events = transport.sockets.lock()[0].1.clone();
        events.send(TransportEvent::Closed(Some("gone".to_string()))).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.sockets.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        wait_for(&client, ConnectionState::Open).await;
        client.channels().await.unwrap();

        assert_eq!(*transport.sockets.lock()[1].0.sent.lock(), vec![join("AAPL")]);
        assert_eq!(*errors.lock(), vec!["connection lost: gone".to_string()]);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn unauthorized_is_fatal_until_disconnect() {
        let (ports, tokens, transport) = fake_ports();
        tokens.failures.lock().push_back(AuthError::Unauthorized);
        let client = Client::new(settings(&["AAPL"], &[0]), ports).unwrap();

        client.connect().unwrap();
        wait_for(&client, ConnectionState::Fatal).await;

        client.connect().unwrap();
        client.channels().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Fatal);
        assert!(transport.requests.lock().is_empty());

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.connect().unwrap();
        wait_for(&client, ConnectionState::Open).await;
        client.disconnect().await;
    }

    #[tokio::test]
    async fn connect_is_ignored_unless_idle_or_healing() {
        let (ports, _tokens, transport) = fake_ports();
        let client = Client::new(settings(&["AAPL"], &[0]), ports).unwrap();
        client.connect().unwrap();
        wait_for(&client, ConnectionState::Open).await;

        client.connect().unwrap();
        client.connect().unwrap();
        client.channels().await.unwrap();

        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(transport.requests.lock().len(), 1);
        assert_eq!(*transport.sockets.lock()[0].0.sent.lock(), vec![join("AAPL")]);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_clears_channels() {
        let (ports, _tokens, _transport) = fake_ports();
        let client = Client::new(settings(&["AAPL", "MSFT"], &[0]), ports).unwrap();
        client.connect().unwrap();
        wait_for(&client, ConnectionState::Open).await;

        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.channels().await.unwrap(), ChannelSnapshot::default());
    }
}

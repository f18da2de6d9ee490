//! Client Handle
//!
//! The public face of one realtime connection. Every method is a message to
//! the supervisor task, so the handle is cheap, never blocks on I/O and can
//! be called from callbacks or other threads.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo(client: intrinio_realtime::Client) -> Result<(), intrinio_realtime::ClientError> {
//! client.on_trade(|trade| println!("{} {} @ {}", trade.symbol, trade.size, trade.price));
//! client.join(["AAPL", "MSFT"])?;
//! client.connect()?;
//! // ...
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use crate::domain::connection::ConnectionState;
use crate::domain::streaming::{Quote, Trade};
use crate::domain::subscription::{ChannelSnapshot, SubscriptionError, parse_channels};

use super::callbacks::{FeedError, Handlers};
use super::supervisor::{Command, ConnectionSupervisor, SupervisorPorts, SupervisorSettings};

/// Errors returned by [`Client`] methods.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A channel name was rejected.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// The supervisor task has stopped.
    #[error("client supervisor is no longer running")]
    SupervisorGone,

    /// The client was created outside a Tokio runtime.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Handle to a realtime connection.
#[derive(Debug)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    handlers: Arc<Handlers>,
    closing: Arc<AtomicBool>,
}

impl Client {
    /// Spawn the supervisor on the current runtime and return its handle.
    ///
    /// The client starts `Disconnected`; call [`Client::connect`] to open.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoRuntime`] when called outside a Tokio runtime.
    pub fn new(settings: SupervisorSettings, ports: SupervisorPorts) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|e| ClientError::NoRuntime(e.to_string()))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let handlers = Arc::new(Handlers::default());
        let closing = Arc::new(AtomicBool::new(false));

        let supervisor = ConnectionSupervisor::new(
            settings,
            ports,
            handlers.clone(),
            closing.clone(),
            state_tx,
            command_rx,
        );
        runtime.spawn(supervisor.run());

        Ok(Self {
            commands,
            state,
            handlers,
            closing,
        })
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SupervisorGone)
    }

    /// Start connecting. Returns immediately; watch [`Client::state`] or
    /// [`Client::state_changes`] for progress.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SupervisorGone`] if the supervisor has stopped.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(Command::Connect)
    }

    /// Close the socket, cancel pending retries, drop every channel and stop
    /// the workers. Resolves once the client is `Disconnected`.
    pub async fn disconnect(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let (done, wait) = oneshot::channel();
        if self.send(Command::Disconnect(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Add channels. Joined immediately when open, otherwise on next open.
    ///
    /// # Errors
    ///
    /// Returns an error if any name is empty; nothing is joined in that case.
    pub fn join<I, S>(&self, channels: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = parse_channels(channels)?;
        self.send(Command::Join(channels))
    }

    /// Remove channels.
    ///
    /// # Errors
    ///
    /// Returns an error if any name is empty; nothing is left in that case.
    pub fn leave<I, S>(&self, channels: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = parse_channels(channels)?;
        self.send(Command::Leave(channels))
    }

    /// Remove every channel.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SupervisorGone`] if the supervisor has stopped.
    pub fn leave_all(&self) -> Result<(), ClientError> {
        self.send(Command::LeaveAll)
    }

    /// Set the trade handler.
    pub fn on_trade(&self, callback: impl Fn(Trade) + Send + Sync + 'static) {
        self.handlers.set_trade(Arc::new(callback));
    }

    /// Set the quote handler.
    pub fn on_quote(&self, callback: impl Fn(Quote) + Send + Sync + 'static) {
        self.handlers.set_quote(Arc::new(callback));
    }

    /// Set the error handler. Without one, errors are only logged.
    ///
    /// Frame errors are reported from the worker threads, connection errors
    /// from the connection task. Keep the handler short.
    pub fn on_error(&self, callback: impl Fn(&FeedError) + Send + Sync + 'static) {
        self.handlers.set_error(Arc::new(callback));
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Desired and joined channels.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SupervisorGone`] if the supervisor has stopped.
    pub async fn channels(&self) -> Result<ChannelSnapshot, ClientError> {
        let (reply, wait) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        wait.await.map_err(|_| ClientError::SupervisorGone)
    }
}

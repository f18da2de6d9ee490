//! Heartbeat Manager
//!
//! Keeps an open socket alive by sending the protocol's keep-alive frame at a
//! fixed interval. One manager runs per open socket and is cancelled when the
//! socket closes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Connection, Heartbeat};

/// Sends keep-alives over one connection until cancelled or the connection
/// refuses a frame.
pub struct HeartbeatManager {
    heartbeat: Heartbeat,
    connection: Arc<dyn Connection>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub fn new(
        heartbeat: Heartbeat,
        connection: Arc<dyn Connection>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            heartbeat,
            connection,
            cancel,
        }
    }

    /// Spawn the loop onto the current runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the keep-alive loop.
    ///
    /// The first frame goes out one interval after start.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.heartbeat.interval;
        let mut interval = tokio::time::interval_at(start, self.heartbeat.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.connection.send(self.heartbeat.frame.clone()).is_err() {
                        tracing::debug!("Connection closed, stopping heartbeat");
                        break;
                    }
                    tracing::trace!("Heartbeat sent");
                }
            }
        }
    }
}

//! Channel Subscription Tracking
//!
//! Tracks which channels the caller wants (`desired`) versus which channels
//! the server has been told about on the current socket (`joined`), and
//! reconciles the two by emitting the minimal set of join/leave actions.
//!
//! # Design
//!
//! - `desired` is mutated only through the public API (`join`, `leave`,
//!   `leave_all`).
//! - `joined` is mutated only by [`ChannelRegistry::reconcile`] and by
//!   [`ChannelRegistry::reset_joined`] when a socket goes away.
//! - `joined` never contains a channel that was not in `desired` at the time
//!   it was joined.
//!
//! Encoding of the actual control frames is left to the caller so this
//! module stays independent of the wire protocol.

use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Types
// =============================================================================

/// Literal channel name that subscribes to every symbol (the firehose).
pub const LOBBY: &str = "lobby";

/// A subscription key, usually a ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(String);

impl Channel {
    /// Create a channel from a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, whitespace or not ASCII.
    pub fn new(name: impl Into<String>) -> Result<Self, SubscriptionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SubscriptionError::EmptyChannel);
        }
        if !name.is_ascii() {
            return Err(SubscriptionError::NonAsciiChannel(name));
        }
        Ok(Self(name))
    }

    /// The firehose channel.
    #[must_use]
    pub fn lobby() -> Self {
        Self(LOBBY.to_string())
    }

    /// Whether this is the firehose channel.
    #[must_use]
    pub fn is_lobby(&self) -> bool {
        self.0 == LOBBY
    }

    /// Channel name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a batch of channel names, rejecting the whole batch on the first
/// invalid entry.
///
/// # Errors
///
/// Returns an error if any name is empty or not ASCII.
pub fn parse_channels<I, S>(names: I) -> Result<Vec<Channel>, SubscriptionError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Channel::new).collect()
}

/// Kind of control message a reconciliation emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Start receiving a channel.
    Join,
    /// Stop receiving a channel.
    Leave,
}

/// Errors raised by subscription operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// Channel name was empty.
    #[error("channel name cannot be empty")]
    EmptyChannel,

    /// Channel name contains non-ASCII characters.
    #[error("channel name must be ASCII: {0:?}")]
    NonAsciiChannel(String),
}

// =============================================================================
// Reconcile Summary
// =============================================================================

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Channels a join was sent for.
    pub joined: Vec<Channel>,
    /// Channels a leave was sent for.
    pub left: Vec<Channel>,
}

impl ReconcileSummary {
    /// Whether no control frames were sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }

    /// Number of control frames sent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.joined.len() + self.left.len()
    }
}

/// Read-only view of the subscription sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Channels the caller asked for.
    pub desired: Vec<Channel>,
    /// Channels joined on the current socket.
    pub joined: Vec<Channel>,
}

// =============================================================================
// Channel Registry
// =============================================================================

/// Desired vs. joined channel bookkeeping.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    desired: BTreeSet<Channel>,
    joined: BTreeSet<Channel>,
    trades_only: bool,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(trades_only: bool) -> Self {
        Self {
            desired: BTreeSet::new(),
            joined: BTreeSet::new(),
            trades_only,
        }
    }

    /// Whether joins request trades only.
    #[must_use]
    pub const fn trades_only(&self) -> bool {
        self.trades_only
    }

    /// Add channels to the desired set.
    pub fn join(&mut self, channels: impl IntoIterator<Item = Channel>) {
        self.desired.extend(channels);
    }

    /// Remove channels from the desired set.
    pub fn leave<'a>(&mut self, channels: impl IntoIterator<Item = &'a Channel>) {
        for channel in channels {
            self.desired.remove(channel);
        }
    }

    /// Clear the desired set.
    pub fn leave_all(&mut self) {
        self.desired.clear();
    }

    /// Forget everything joined on the current socket.
    ///
    /// Called when the socket closes; the next socket starts with no joins.
    pub fn reset_joined(&mut self) {
        self.joined.clear();
    }

    /// Clear both sets.
    pub fn clear(&mut self) {
        self.desired.clear();
        self.joined.clear();
    }

    /// Number of channels joined on the current socket.
    #[must_use]
    pub fn joined_count(&self) -> usize {
        self.joined.len()
    }

    /// Whether `desired` and `joined` already agree.
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        self.desired == self.joined
    }

    /// Snapshot both sets.
    #[must_use]
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            desired: self.desired.iter().cloned().collect(),
            joined: self.joined.iter().cloned().collect(),
        }
    }

    /// Send the control messages needed to make `joined` equal `desired`.
    ///
    /// Joins are emitted before leaves, each group in channel order. `send` is
    /// invoked once per channel with the action and the trades-only flag. If it
    /// fails, `joined` reflects only the messages that were sent and the error
    /// is returned; the remaining work is picked up by the next call.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `send`.
    pub fn reconcile<E, F>(&mut self, mut send: F) -> Result<ReconcileSummary, E>
    where
        F: FnMut(ControlAction, &Channel, bool) -> Result<(), E>,
    {
        let to_join: Vec<Channel> = self.desired.difference(&self.joined).cloned().collect();
        let to_leave: Vec<Channel> = self.joined.difference(&self.desired).cloned().collect();

        let mut summary = ReconcileSummary::default();

        for channel in to_join {
            send(ControlAction::Join, &channel, self.trades_only)?;
            tracing::info!(channel = %channel, "Joined channel");
            self.joined.insert(channel.clone());
            summary.joined.push(channel);
        }

        for channel in to_leave {
            send(ControlAction::Leave, &channel, self.trades_only)?;
            tracing::info!(channel = %channel, "Left channel");
            self.joined.remove(&channel);
            summary.left.push(channel);
        }

        tracing::debug!(channels = self.joined.len(), "Channels reconciled");
        Ok(summary)
    }
}

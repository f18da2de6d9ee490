//! Self-Heal Scheduling
//!
//! Escalating-then-flat reconnection delays and the single pending retry
//! timer owned by the connection supervisor.
//!
//! Unlike an exponential policy, the delays are an explicit list walked from
//! the front: each failure consumes the head, and once one entry is left it
//! is reused until a successful open restores the full list.

use std::collections::VecDeque;
use std::future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Sleep;

/// Default delays, in milliseconds.
pub const DEFAULT_BACKOFF_MS: [u64; 6] = [0, 100, 500, 1_000, 2_000, 5_000];

/// Invalid backoff sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    /// The sequence has no entries.
    #[error("backoff sequence cannot be empty")]
    Empty,

    /// An entry is shorter than the one before it.
    #[error("backoff sequence must be non-decreasing (entry {index})")]
    Decreasing {
        /// Position of the offending entry.
        index: usize,
    },
}

// =============================================================================
// Backoff Schedule
// =============================================================================

/// Ordered, non-decreasing retry delays that never run out.
///
/// # Example
///
/// ```rust
/// use intrinio_realtime::application::services::BackoffSchedule;
/// use std::time::Duration;
///
/// let mut schedule = BackoffSchedule::new(vec![
///     Duration::ZERO,
///     Duration::from_millis(100),
/// ]).unwrap();
///
/// assert_eq!(schedule.next_delay(), Duration::ZERO);
/// assert_eq!(schedule.next_delay(), Duration::from_millis(100));
/// assert_eq!(schedule.next_delay(), Duration::from_millis(100));
///
/// schedule.reset();
/// assert_eq!(schedule.next_delay(), Duration::ZERO);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    configured: Vec<Duration>,
    remaining: VecDeque<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        let configured: Vec<Duration> = DEFAULT_BACKOFF_MS
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect();
        Self {
            remaining: configured.iter().copied().collect(),
            configured,
        }
    }
}

impl BackoffSchedule {
    /// Create a schedule from explicit delays.
    ///
    /// # Errors
    ///
    /// Returns an error if `delays` is empty or decreases anywhere.
    pub fn new(delays: Vec<Duration>) -> Result<Self, BackoffError> {
        Self::validate(&delays)?;
        Ok(Self {
            remaining: delays.iter().copied().collect(),
            configured: delays,
        })
    }

    /// Check a delay list without building a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if `delays` is empty or decreases anywhere.
    pub fn validate(delays: &[Duration]) -> Result<(), BackoffError> {
        if delays.is_empty() {
            return Err(BackoffError::Empty);
        }
        if let Some(index) = delays.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(BackoffError::Decreasing { index: index + 1 });
        }
        Ok(())
    }

    /// Delay for the next retry. Consumes the head unless it is the last entry.
    pub fn next_delay(&mut self) -> Duration {
        if self.remaining.len() > 1 {
            self.remaining.pop_front().unwrap_or_default()
        } else {
            self.remaining.front().copied().unwrap_or_default()
        }
    }

    /// Restore the full configured sequence.
    pub fn reset(&mut self) {
        self.remaining = self.configured.iter().copied().collect();
    }

    /// Delays still ahead, head first.
    #[must_use]
    pub fn remaining(&self) -> Vec<Duration> {
        self.remaining.iter().copied().collect()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// One-slot retry timer driven by a [`BackoffSchedule`].
///
/// The scheduler never runs anything itself: the owner awaits
/// [`SelfHealScheduler::expired`] and starts the retry.
#[derive(Debug)]
pub struct SelfHealScheduler {
    backoff: BackoffSchedule,
    pending: Option<Pin<Box<Sleep>>>,
    closing: Arc<AtomicBool>,
}

impl SelfHealScheduler {
    /// Create a scheduler that stays silent while `closing` is set.
    #[must_use]
    pub const fn new(backoff: BackoffSchedule, closing: Arc<AtomicBool>) -> Self {
        Self {
            backoff,
            pending: None,
            closing,
        }
    }

    /// Arm the retry timer with the next delay.
    ///
    /// Replaces any pending timer. Returns the delay, or `None` when the
    /// client is closing and nothing was armed.
    pub fn schedule(&mut self) -> Option<Duration> {
        if self.closing.load(Ordering::SeqCst) {
            tracing::debug!("Closing, not scheduling a retry");
            return None;
        }

        self.cancel();
        let delay = self.backoff.next_delay();
        self.pending = Some(Box::pin(tokio::time::sleep(delay)));
        tracing::info!(delay_ms = delay.as_millis(), "Scheduled reconnection");
        Some(delay)
    }

    /// Cancel the pending timer and restore the full backoff.
    pub fn on_connect_success(&mut self) {
        self.cancel();
        self.backoff.reset();
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Whether a retry timer is armed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Backoff state.
    #[must_use]
    pub const fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }

    /// Resolve when the armed timer fires, disarming it. Pending forever when
    /// nothing is armed. Cancel-safe.
    pub async fn expired(&mut self) {
        match self.pending.as_mut() {
            Some(sleep) => {
                sleep.await;
                self.pending = None;
            }
            None => future::pending::<()>().await,
        }
    }
}

//! User Callback Slots
//!
//! Typed slots for the trade, quote and error handlers. Workers read the
//! current handler per event, so replacing a handler takes effect on the
//! next event without restarting anything.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{AuthError, DecodeError, TransportError};
use crate::domain::streaming::{Quote, Trade};

/// Trade handler.
pub type TradeCallback = Arc<dyn Fn(Trade) + Send + Sync>;

/// Quote handler.
pub type QuoteCallback = Arc<dyn Fn(Quote) + Send + Sync>;

/// Error handler.
pub type ErrorCallback = Arc<dyn Fn(&FeedError) + Send + Sync>;

// =============================================================================
// Feed Errors
// =============================================================================

/// Non-terminal and terminal problems reported to the error handler.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Token exchange failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Socket could not be opened or failed while open.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// Socket closed or errored after opening.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A frame was discarded because it could not be decoded.
    #[error("frame discarded: {0}")]
    Decode(#[from] DecodeError),

    /// Frames were discarded because the ingestion queue was full.
    #[error("{dropped} frame(s) dropped: ingestion queue full")]
    QueueFull {
        /// Frames dropped since the last report.
        dropped: u64,
    },

    /// A user callback panicked.
    #[error("{callback} callback panicked: {message}")]
    CallbackPanic {
        /// Which callback.
        callback: &'static str,
        /// Panic payload, if it was a string.
        message: String,
    },
}

// =============================================================================
// Handlers
// =============================================================================

/// The client's callback slots.
#[derive(Default)]
pub struct Handlers {
    trade: RwLock<Option<TradeCallback>>,
    quote: RwLock<Option<QuoteCallback>>,
    error: RwLock<Option<ErrorCallback>>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("trade", &self.trade.read().is_some())
            .field("quote", &self.quote.read().is_some())
            .field("error", &self.error.read().is_some())
            .finish()
    }
}

impl Handlers {
    /// Replace the trade handler.
    pub fn set_trade(&self, callback: TradeCallback) {
        *self.trade.write() = Some(callback);
    }

    /// Replace the quote handler.
    pub fn set_quote(&self, callback: QuoteCallback) {
        *self.quote.write() = Some(callback);
    }

    /// Replace the error handler.
    pub fn set_error(&self, callback: ErrorCallback) {
        *self.error.write() = Some(callback);
    }

    /// Current trade handler.
    #[must_use]
    pub fn trade(&self) -> Option<TradeCallback> {
        self.trade.read().clone()
    }

    /// Current quote handler.
    #[must_use]
    pub fn quote(&self) -> Option<QuoteCallback> {
        self.quote.read().clone()
    }

    /// Hand `error` to the error handler, if one is set. A panicking error
    /// handler is swallowed.
    pub fn report(&self, error: &FeedError) {
        let Some(callback) = self.error.read().clone() else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
            tracing::error!("Error callback panicked");
        }
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_slots() {
        let handlers = Handlers::default();
        assert!(handlers.trade().is_none());
        assert!(handlers.quote().is_none());
        handlers.report(&FeedError::QueueFull { dropped: 1 });
    }

    #[test]
    fn replacing_handler_takes_effect() {
        let handlers = Handlers::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        handlers.set_error(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        handlers.report(&FeedError::QueueFull { dropped: 1 });

        let counter = second.clone();
        handlers.set_error(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        handlers.report(&FeedError::QueueFull { dropped: 1 });

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_error_handler_is_contained() {
        let handlers = Handlers::default();
        handlers.set_error(Arc::new(|_| panic!("boom")));
        handlers.report(&FeedError::QueueFull { dropped: 1 });
    }

    #[test]
    fn panic_message_extraction() {
        let payload = catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }

    #[test]
    fn feed_error_display() {
        let err = FeedError::Auth(AuthError::Unauthorized);
        assert_eq!(
            err.to_string(),
            "authentication failed: unauthorized: credentials were rejected"
        );
        let err = FeedError::CallbackPanic {
            callback: "trade",
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "trade callback panicked: boom");
    }
}

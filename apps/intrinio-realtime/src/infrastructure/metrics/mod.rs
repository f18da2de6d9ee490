//! Prometheus Metrics Module
//!
//! Client metrics recorded through the `metrics` facade. Recording is a no-op
//! until a recorder is installed, so library users who don't call
//! [`init_metrics`] pay nothing.
//!
//! # Metrics Categories
//!
//! - **Frames**: received, dropped on a full queue, failed to decode
//! - **Events**: dispatched to callbacks by type, callback panics
//! - **Connection**: state gauge, reconnect attempts, joined channels
//! - **Latency**: per-frame decode and dispatch time

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the already installed handle.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "intrinio_frames_received_total",
        "Total frames received from the socket"
    );
    describe_counter!(
        "intrinio_frames_dropped_total",
        "Total frames dropped because the ingestion queue was full"
    );
    describe_counter!(
        "intrinio_decode_errors_total",
        "Total frames discarded because they failed to decode"
    );

    // Event counters
    describe_counter!(
        "intrinio_events_dispatched_total",
        "Total events handed to user callbacks by type"
    );
    describe_counter!(
        "intrinio_callback_panics_total",
        "Total user callback panics caught by workers"
    );

    // Connection
    describe_gauge!(
        "intrinio_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 open, 3 self-healing, 4 closing, 5 fatal)"
    );
    describe_counter!(
        "intrinio_reconnect_attempts_total",
        "Total scheduled reconnection attempts"
    );
    describe_gauge!(
        "intrinio_channels_joined",
        "Channels joined on the current socket"
    );

    // Latency
    describe_histogram!(
        "intrinio_frame_processing_seconds",
        "Time to decode a frame and dispatch its events"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for dispatched events.
#[derive(Debug, Clone, Copy)]
pub enum EventType {
    /// Trade.
    Trade,
    /// Quote.
    Quote,
}

impl EventType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
        }
    }
}

/// Record a frame received from the socket.
pub fn record_frame_received() {
    counter!("intrinio_frames_received_total").increment(1);
}

/// Record a frame dropped on a full queue.
pub fn record_frame_dropped() {
    counter!("intrinio_frames_dropped_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error() {
    counter!("intrinio_decode_errors_total").increment(1);
}

/// Record an event handed to a callback.
pub fn record_event_dispatched(event_type: EventType) {
    counter!(
        "intrinio_events_dispatched_total",
        "event_type" => event_type.as_str()
    )
    .increment(1);
}

/// Record a callback panic.
pub fn record_callback_panic(event_type: EventType) {
    counter!(
        "intrinio_callback_panics_total",
        "event_type" => event_type.as_str()
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("intrinio_connection_state").set(state.as_gauge());
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect_attempt() {
    counter!("intrinio_reconnect_attempts_total").increment(1);
}

/// Update the joined channel count.
#[allow(clippy::cast_precision_loss)]
pub fn set_channels_joined(count: usize) {
    gauge!("intrinio_channels_joined").set(count as f64);
}

/// Record frame decode plus dispatch time.
pub fn record_processing_duration(duration: Duration) {
    histogram!("intrinio_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_as_str() {
        assert_eq!(EventType::Trade.as_str(), "trade");
        assert_eq!(EventType::Quote.as_str(), "quote");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_frame_dropped();
        record_event_dispatched(EventType::Trade);
        set_connection_state(ConnectionState::Open);
        set_channels_joined(3);
        record_processing_duration(Duration::from_micros(5));
    }

    #[test]
    fn installed_handle_renders_recorded_metrics() {
        let handle = init_metrics().unwrap();
        record_frame_dropped();
        set_connection_state(ConnectionState::SelfHealing);

        let rendered = get_metrics_handle().unwrap().render();
        assert!(rendered.contains("intrinio_frames_dropped_total"));
        assert!(rendered.contains("intrinio_connection_state"));
        assert!(handle.render().contains("intrinio_frames_dropped_total"));
        assert!(init_metrics().is_ok());
    }
}

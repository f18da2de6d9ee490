//! Logging Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`. The
//! client itself only emits `tracing` events; whether and how they are
//! printed is decided here by [`LoggerSetting`].
//!
//! `tracing` events always reach whatever global subscriber the host process
//! installed. [`LoggerSetting::Disabled`] only stops this crate from
//! installing one; to silence the client under the host's subscriber, add
//! `intrinio_realtime=off` to its filter, for example with
//! [`without_client_events`].
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `intrinio_realtime=info`)
//! - `INTRINIO_LOGGER`: `default`, `disabled` or `custom` (default: `default`)
//!
//! # Usage
//!
//! ```ignore
//! use intrinio_realtime::infrastructure::telemetry::{self, LoggerSetting};
//!
//! telemetry::init(&LoggerSetting::Default);
//! tracing::info!("Client starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive applied when `RUST_LOG` is unset or invalid.
const DEFAULT_DIRECTIVE: &str = "intrinio_realtime=info";

/// Directive that drops every event emitted by this crate.
const SILENCE_DIRECTIVE: &str = "intrinio_realtime=off";

/// Who is responsible for printing the client's log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggerSetting {
    /// The client installs a fmt subscriber unless one is already set.
    #[default]
    Default,
    /// The client installs nothing. Events still reach a subscriber the
    /// host installed; filter them with `intrinio_realtime=off`.
    Disabled,
    /// The caller installs their own subscriber and decides what it shows.
    Custom,
}

impl LoggerSetting {
    /// Parse a setting name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "disabled" | "off" | "none" => Some(Self::Disabled),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Build the filter from `RUST_LOG`, falling back to the default directive.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Add a directive to `filter` that drops this crate's events.
///
/// For hosts that install their own subscriber and want the client quiet.
#[must_use]
pub fn without_client_events(filter: EnvFilter) -> EnvFilter {
    match SILENCE_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Install logging according to `setting`.
///
/// Returns `true` if this call installed the global subscriber. A subscriber
/// that is already installed is left untouched.
pub fn init(setting: &LoggerSetting) -> bool {
    match setting {
        LoggerSetting::Default => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
        LoggerSetting::Disabled | LoggerSetting::Custom => false,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_setting() {
        assert_eq!(LoggerSetting::default(), LoggerSetting::Default);
    }

    #[test]
    fn parse_setting() {
        assert_eq!(
            LoggerSetting::from_str_case_insensitive("DISABLED"),
            Some(LoggerSetting::Disabled)
        );
        assert_eq!(
            LoggerSetting::from_str_case_insensitive("custom"),
            Some(LoggerSetting::Custom)
        );
        assert_eq!(LoggerSetting::from_str_case_insensitive("loud"), None);
    }

    #[test]
    fn disabled_and_custom_install_nothing() {
        assert!(!init(&LoggerSetting::Disabled));
        assert!(!init(&LoggerSetting::Custom));
    }

    #[test]
    fn silencing_filter_turns_client_target_off() {
        let filter = without_client_events(EnvFilter::new("info"));
        let rendered = filter.to_string();
        assert!(rendered.contains("intrinio_realtime=off"));
        assert!(rendered.contains("info"));
    }

    #[test]
    fn silenced_host_subscriber_sees_no_client_events() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Count(Arc<AtomicUsize>);
        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Count {
            fn on_event(
                &self,
                _event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry()
            .with(without_client_events(EnvFilter::new("trace")))
            .with(Count(seen.clone()));

        tracing::subscriber::with_default(subscriber, || {
            assert!(!init(&LoggerSetting::Disabled));
            tracing::warn!(target: "intrinio_realtime::supervisor", "hidden");
            tracing::warn!(target: "host_app", "shown");
        });

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_default_init_is_harmless() {
        let _ = init(&LoggerSetting::Default);
        assert!(!init(&LoggerSetting::Default));
    }
}

//! Client Configuration Settings
//!
//! Configuration types for the realtime client, built in code or loaded from
//! `INTRINIO_*` environment variables.

use std::time::Duration;

use crate::application::services::{
    BackoffError, BackoffSchedule, ClientError, DEFAULT_BACKOFF_MS, PipelineSettings,
};
use crate::domain::subscription::{Channel, SubscriptionError, parse_channels};
use crate::infrastructure::intrinio::{
    CLIENT_INFORMATION, Credentials, DEFAULT_AUTH_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, WireVersion,
};
use crate::infrastructure::telemetry::LoggerSetting;

/// Intrinio realtime provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    /// Realtime equities (binary).
    #[default]
    Realtime,
    /// Delayed SIP (binary).
    DelayedSip,
    /// Nasdaq Basic (binary).
    NasdaqBasic,
    /// Self-hosted endpoint at a caller-supplied address (binary, plain http/ws).
    Manual,
    /// IEX (Phoenix JSON).
    Iex,
}

impl Provider {
    /// Parse a provider name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "REALTIME" => Some(Self::Realtime),
            "DELAYED_SIP" => Some(Self::DelayedSip),
            "NASDAQ_BASIC" => Some(Self::NasdaqBasic),
            "MANUAL" => Some(Self::Manual),
            "IEX" => Some(Self::Iex),
            _ => None,
        }
    }

    /// Provider name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "REALTIME",
            Self::DelayedSip => "DELAYED_SIP",
            Self::NasdaqBasic => "NASDAQ_BASIC",
            Self::Manual => "MANUAL",
            Self::Iex => "IEX",
        }
    }

    /// Hosted domain, or `None` for [`Provider::Manual`].
    #[must_use]
    pub const fn host(&self) -> Option<&'static str> {
        match self {
            Self::Realtime => Some("realtime-mx.intrinio.com"),
            Self::DelayedSip => Some("realtime-delayed-sip.intrinio.com"),
            Self::NasdaqBasic => Some("realtime-nasdaq-basic.intrinio.com"),
            Self::Iex => Some("realtime.intrinio.com"),
            Self::Manual => None,
        }
    }

    /// Whether the provider speaks Phoenix JSON rather than binary frames.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Iex)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account credentials.
    pub credentials: Credentials,
    /// Feed provider.
    pub provider: Provider,
    /// `host[:port]` for [`Provider::Manual`].
    pub manual_address: Option<String>,
    /// Channels joined on first open.
    pub channels: Vec<String>,
    /// Request trades only.
    pub trades_only: bool,
    /// Binary record layout.
    pub wire_version: WireVersion,
    /// Logging ownership.
    pub logger: LoggerSetting,
    /// Worker pool sizing.
    pub pipeline: PipelineSettings,
    /// Reconnection delays.
    pub backoff: Vec<Duration>,
    /// Keep-alive interval.
    pub heartbeat_interval: Duration,
    /// Token request timeout.
    pub auth_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with defaults for everything but credentials and provider.
    #[must_use]
    pub fn new(credentials: Credentials, provider: Provider) -> Self {
        Self {
            credentials,
            provider,
            manual_address: None,
            channels: Vec::new(),
            trades_only: false,
            wire_version: WireVersion::default(),
            logger: LoggerSetting::default(),
            pipeline: PipelineSettings::default(),
            backoff: DEFAULT_BACKOFF_MS.iter().copied().map(Duration::from_millis).collect(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Set the manual provider address.
    #[must_use]
    pub fn with_manual_address(mut self, address: impl Into<String>) -> Self {
        self.manual_address = Some(address.into());
        self
    }

    /// Set the initial channels.
    #[must_use]
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Request trades only.
    #[must_use]
    pub const fn with_trades_only(mut self, trades_only: bool) -> Self {
        self.trades_only = trades_only;
        self
    }

    /// Select the binary record layout.
    #[must_use]
    pub const fn with_wire_version(mut self, version: WireVersion) -> Self {
        self.wire_version = version;
        self
    }

    /// Select logging ownership.
    #[must_use]
    pub const fn with_logger(mut self, logger: LoggerSetting) -> Self {
        self.logger = logger;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.pipeline.worker_count = workers;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.pipeline.queue_capacity = capacity;
        self
    }

    /// Set the reconnection delays.
    #[must_use]
    pub fn with_backoff(mut self, delays: Vec<Duration>) -> Self {
        self.backoff = delays;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key/value source.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = match lookup("INTRINIO_API_KEY") {
            Some(key) if key.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("INTRINIO_API_KEY".to_string()));
            }
            Some(key) => Credentials::api_key(key),
            None => {
                let username = lookup("INTRINIO_USERNAME")
                    .ok_or_else(|| ConfigError::MissingEnvVar("INTRINIO_API_KEY".to_string()))?;
                let password = lookup("INTRINIO_PASSWORD")
                    .ok_or_else(|| ConfigError::MissingEnvVar("INTRINIO_PASSWORD".to_string()))?;
                Credentials::user_pass(username, password)
            }
        };

        let provider = match lookup("INTRINIO_PROVIDER") {
            Some(value) => Provider::from_str_case_insensitive(&value)
                .ok_or_else(|| invalid("INTRINIO_PROVIDER", &value))?,
            None => Provider::default(),
        };

        let mut config = Self::new(credentials, provider);
        config.manual_address =
            lookup("INTRINIO_MANUAL_ADDRESS").filter(|address| !address.trim().is_empty());

        if let Some(channels) = lookup("INTRINIO_CHANNELS") {
            config.channels = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("INTRINIO_TRADES_ONLY") {
            config.trades_only = parse_bool("INTRINIO_TRADES_ONLY", &value)?;
        }
        if let Some(value) = lookup("INTRINIO_WIRE_VERSION") {
            config.wire_version = WireVersion::from_str_case_insensitive(&value)
                .ok_or_else(|| invalid("INTRINIO_WIRE_VERSION", &value))?;
        }
        if let Some(value) = lookup("INTRINIO_LOGGER") {
            config.logger = LoggerSetting::from_str_case_insensitive(&value)
                .ok_or_else(|| invalid("INTRINIO_LOGGER", &value))?;
        }
        if let Some(value) = lookup("INTRINIO_WORKERS") {
            config.pipeline.worker_count = parse_number("INTRINIO_WORKERS", &value)?;
        }
        if let Some(value) = lookup("INTRINIO_QUEUE_CAPACITY") {
            config.pipeline.queue_capacity = parse_number("INTRINIO_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("INTRINIO_WORKER_SHUTDOWN_TIMEOUT_SECS") {
            config.pipeline.shutdown_timeout =
                Duration::from_secs(parse_number("INTRINIO_WORKER_SHUTDOWN_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = lookup("INTRINIO_BACKOFF_MS") {
            config.backoff = value
                .split(',')
                .map(|ms| parse_number::<u64>("INTRINIO_BACKOFF_MS", ms).map(Duration::from_millis))
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = lookup("INTRINIO_HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval =
                Duration::from_secs(parse_number("INTRINIO_HEARTBEAT_INTERVAL_SECS", &value)?);
        }

        Ok(config)
    }

    /// Check the configuration for values the client cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.is_empty() {
            return Err(ConfigError::EmptyCredentials);
        }
        if self.provider == Provider::Manual && self.manual_address.is_none() {
            return Err(ConfigError::MissingManualAddress);
        }
        if self.pipeline.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        BackoffSchedule::validate(&self.backoff)?;
        self.parsed_channels()?;
        Ok(())
    }

    /// Initial channels as domain values.
    ///
    /// # Errors
    ///
    /// Returns an error if any name is empty.
    pub fn parsed_channels(&self) -> Result<Vec<Channel>, SubscriptionError> {
        parse_channels(self.channels.iter().cloned())
    }

    fn base_address(&self) -> Result<(&str, &'static str, &'static str), ConfigError> {
        match self.provider.host() {
            Some(host) => Ok((host, "https", "wss")),
            None => self
                .manual_address
                .as_deref()
                .map(|address| (address, "http", "ws"))
                .ok_or(ConfigError::MissingManualAddress),
        }
    }

    /// Token exchange URL.
    ///
    /// # Errors
    ///
    /// Returns an error for a manual provider without an address.
    pub fn auth_url(&self) -> Result<String, ConfigError> {
        let (host, scheme, _) = self.base_address()?;
        Ok(format!("{scheme}://{host}/auth"))
    }

    /// Socket URL up to and including `token=`.
    ///
    /// # Errors
    ///
    /// Returns an error for a manual provider without an address.
    pub fn socket_url_prefix(&self) -> Result<String, ConfigError> {
        let (host, _, scheme) = self.base_address()?;
        Ok(format!("{scheme}://{host}/socket/websocket?vsn=1.0.0&token="))
    }

    /// Extra socket request headers.
    #[must_use]
    pub fn socket_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![(
            "Client-Information".to_string(),
            CLIENT_INFORMATION.to_string(),
        )];
        if !self.provider.is_json() && self.wire_version == WireVersion::V2 {
            headers.push(("UseNewEquitiesFormat".to_string(), "v2".to_string()));
        }
        headers
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// API key, username or password is empty.
    #[error("credentials cannot be empty")]
    EmptyCredentials,
    /// Manual provider without an address.
    #[error("manual provider requires an address")]
    MissingManualAddress,
    /// Worker count is zero.
    #[error("worker count must be at least 1")]
    ZeroWorkers,
    /// Queue capacity is zero.
    #[error("queue capacity must be at least 1")]
    ZeroQueueCapacity,
    /// Invalid backoff sequence.
    #[error(transparent)]
    Backoff(#[from] BackoffError),
    /// Invalid channel name.
    #[error(transparent)]
    Channel(#[from] SubscriptionError),
    /// The HTTP client for token requests could not be built.
    #[error("failed to build token client: {0}")]
    TokenClient(String),
    /// The client could not be started.
    #[error(transparent)]
    Client(#[from] ClientError),
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test_case("realtime", Provider::Realtime)]
    #[test_case("DELAYED_SIP", Provider::DelayedSip)]
    #[test_case("nasdaq-basic", Provider::NasdaqBasic)]
    #[test_case("Manual", Provider::Manual)]
    #[test_case("iex", Provider::Iex)]
    fn provider_parsing(input: &str, expected: Provider) {
        assert_eq!(Provider::from_str_case_insensitive(input), Some(expected));
    }

    #[test]
    fn unknown_provider_rejected() {
        assert_eq!(Provider::from_str_case_insensitive("alpaca"), None);
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::new(Credentials::api_key("key"), Provider::Realtime);
        assert_eq!(config.pipeline.worker_count, 4);
        assert_eq!(config.pipeline.queue_capacity, 10_000);
        assert_eq!(config.backoff.len(), 6);
        assert_eq!(config.wire_version, WireVersion::V1);
        assert!(!config.trades_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_lookup_api_key() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("INTRINIO_API_KEY", "abc"),
            ("INTRINIO_PROVIDER", "iex"),
            ("INTRINIO_CHANNELS", "AAPL, MSFT,,"),
            ("INTRINIO_TRADES_ONLY", "true"),
            ("INTRINIO_WORKERS", "2"),
            ("INTRINIO_BACKOFF_MS", "0,250,1000"),
        ]))
        .unwrap();

        assert_eq!(config.credentials, Credentials::api_key("abc"));
        assert_eq!(config.provider, Provider::Iex);
        assert_eq!(config.channels, vec!["AAPL", "MSFT"]);
        assert!(config.trades_only);
        assert_eq!(config.pipeline.worker_count, 2);
        assert_eq!(
            config.backoff,
            vec![Duration::ZERO, Duration::from_millis(250), Duration::from_secs(1)]
        );
    }

    #[test]
    fn from_lookup_user_pass() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("INTRINIO_USERNAME", "user"),
            ("INTRINIO_PASSWORD", "pass"),
        ]))
        .unwrap();
        assert_eq!(config.credentials, Credentials::user_pass("user", "pass"));
    }

    #[test]
    fn from_lookup_missing_credentials() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "INTRINIO_API_KEY"));
    }

    #[test]
    fn from_lookup_empty_api_key() {
        let err = ClientConfig::from_lookup(lookup(&[("INTRINIO_API_KEY", " ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test_case("INTRINIO_WORKERS", "many")]
    #[test_case("INTRINIO_TRADES_ONLY", "maybe")]
    #[test_case("INTRINIO_WIRE_VERSION", "v3")]
    #[test_case("INTRINIO_BACKOFF_MS", "0,x")]
    fn from_lookup_invalid_value(key: &str, value: &str) {
        let err = ClientConfig::from_lookup(lookup(&[("INTRINIO_API_KEY", "k"), (key, value)]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn validation_failures() {
        let base = || ClientConfig::new(Credentials::api_key("key"), Provider::Realtime);

        let config = ClientConfig::new(Credentials::user_pass("user", ""), Provider::Realtime);
        assert!(matches!(config.validate(), Err(ConfigError::EmptyCredentials)));

        let config = ClientConfig::new(Credentials::api_key("key"), Provider::Manual);
        assert!(matches!(config.validate(), Err(ConfigError::MissingManualAddress)));

        assert!(matches!(base().with_workers(0).validate(), Err(ConfigError::ZeroWorkers)));
        assert!(matches!(
            base().with_queue_capacity(0).validate(),
            Err(ConfigError::ZeroQueueCapacity)
        ));
        assert!(matches!(
            base().with_backoff(vec![]).validate(),
            Err(ConfigError::Backoff(BackoffError::Empty))
        ));
        assert!(matches!(
            base()
                .with_backoff(vec![Duration::from_secs(2), Duration::from_secs(1)])
                .validate(),
            Err(ConfigError::Backoff(BackoffError::Decreasing { index: 1 }))
        ));
        assert!(matches!(
            base().with_channels(["AAPL", ""]).validate(),
            Err(ConfigError::Channel(SubscriptionError::EmptyChannel))
        ));
    }

    #[test]
    fn hosted_urls() {
        let config = ClientConfig::new(Credentials::api_key("key"), Provider::DelayedSip);
        assert_eq!(
            config.auth_url().unwrap(),
            "https://realtime-delayed-sip.intrinio.com/auth"
        );
        assert_eq!(
            config.socket_url_prefix().unwrap(),
            "wss://realtime-delayed-sip.intrinio.com/socket/websocket?vsn=1.0.0&token="
        );
    }

    #[test]
    fn manual_urls_use_plain_schemes() {
        let config = ClientConfig::new(Credentials::api_key("key"), Provider::Manual)
            .with_manual_address("10.0.0.5:8080");
        assert_eq!(config.auth_url().unwrap(), "http://10.0.0.5:8080/auth");
        assert_eq!(
            config.socket_url_prefix().unwrap(),
            "ws://10.0.0.5:8080/socket/websocket?vsn=1.0.0&token="
        );
    }

    #[test]
    fn v2_header_only_for_binary_providers() {
        let binary = ClientConfig::new(Credentials::api_key("key"), Provider::Realtime)
            .with_wire_version(WireVersion::V2);
        assert!(
            binary
                .socket_headers()
                .contains(&("UseNewEquitiesFormat".to_string(), "v2".to_string()))
        );

        let iex = ClientConfig::new(Credentials::api_key("key"), Provider::Iex)
            .with_wire_version(WireVersion::V2);
        assert_eq!(iex.socket_headers().len(), 1);

        let v1 = ClientConfig::new(Credentials::api_key("key"), Provider::Realtime);
        assert_eq!(v1.socket_headers()[0].0, "Client-Information");
        assert_eq!(v1.socket_headers().len(), 1);
    }
}

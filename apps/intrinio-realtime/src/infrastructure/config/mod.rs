//! Configuration Module
//!
//! Configuration loading and dependency injection for the realtime client.

mod settings;

use std::sync::Arc;

pub use settings::{ClientConfig, ConfigError, Provider};

use crate::application::ports::{FeedProtocol, SocketEndpoint};
use crate::application::services::{
    BackoffSchedule, Client, SupervisorPorts, SupervisorSettings,
};
use crate::infrastructure::intrinio::{
    BinaryProtocol, HttpTokenProvider, PhoenixProtocol, WebSocketTransport,
};
use crate::infrastructure::telemetry;

/// Validate `config`, wire the Intrinio adapters and spawn the client.
///
/// Installs logging per [`ClientConfig::logger`]. Must be called inside a
/// Tokio runtime. The client starts `Disconnected`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or no runtime is running.
pub fn build_client(config: &ClientConfig) -> Result<Client, ConfigError> {
    config.validate()?;
    telemetry::init(&config.logger);

    let tokens = HttpTokenProvider::new(
        config.auth_url()?,
        config.credentials.clone(),
        config.auth_timeout,
    )
    .map_err(|e| ConfigError::TokenClient(e.to_string()))?;

    let protocol: Arc<dyn FeedProtocol> = if config.provider.is_json() {
        Arc::new(PhoenixProtocol::new().with_heartbeat_interval(config.heartbeat_interval))
    } else {
        Arc::new(
            BinaryProtocol::new(config.wire_version)
                .with_heartbeat_interval(config.heartbeat_interval),
        )
    };

    let ports = SupervisorPorts {
        tokens: Arc::new(tokens),
        transport: Arc::new(WebSocketTransport::new()),
        protocol,
        endpoint: SocketEndpoint::new(config.socket_url_prefix()?, config.socket_headers()),
    };

    let settings = SupervisorSettings {
        channels: config.parsed_channels()?,
        trades_only: config.trades_only,
        backoff: BackoffSchedule::new(config.backoff.clone())?,
        pipeline: config.pipeline.clone(),
    };

    tracing::info!(
        provider = %config.provider,
        wire_version = config.wire_version.as_str(),
        workers = config.pipeline.worker_count,
        channels = config.channels.len(),
        "Building realtime client"
    );

    Ok(Client::new(settings, ports)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionState;
    use crate::infrastructure::intrinio::Credentials;
    use crate::infrastructure::telemetry::LoggerSetting;

    #[tokio::test]
    async fn builds_disconnected_client() {
        let config = ClientConfig::new(Credentials::api_key("key"), Provider::Iex)
            .with_channels(["AAPL"])
            .with_logger(LoggerSetting::Disabled);

        let client = build_client(&config).unwrap();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.channels().await.unwrap().desired.len(), 1);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_spawning() {
        let config = ClientConfig::new(Credentials::api_key("key"), Provider::Manual)
            .with_logger(LoggerSetting::Disabled);
        assert!(matches!(
            build_client(&config),
            Err(ConfigError::MissingManualAddress)
        ));
    }
}

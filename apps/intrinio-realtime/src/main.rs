//! Intrinio Realtime Binary
//!
//! Connects to an Intrinio realtime feed and logs every trade and quote.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin intrinio-realtime
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `INTRINIO_API_KEY`: API key, or
//! - `INTRINIO_USERNAME` and `INTRINIO_PASSWORD`
//!
//! ## Optional
//! - `INTRINIO_PROVIDER`: REALTIME | DELAYED_SIP | NASDAQ_BASIC | MANUAL | IEX (default: REALTIME)
//! - `INTRINIO_MANUAL_ADDRESS`: `host[:port]` for MANUAL
//! - `INTRINIO_CHANNELS`: Comma-separated tickers, `lobby` for the firehose (default: lobby)
//! - `INTRINIO_TRADES_ONLY`: true | false (default: false)
//! - `INTRINIO_WIRE_VERSION`: v1 | v2 (default: v1)
//! - `INTRINIO_LOGGER`: default | disabled | custom (default: default)
//! - `INTRINIO_WORKERS`: Worker threads (default: 4)
//! - `INTRINIO_QUEUE_CAPACITY`: Queued frames before dropping (default: 10000)
//! - `INTRINIO_WORKER_SHUTDOWN_TIMEOUT_SECS`: Per-worker stop timeout (default: 7)
//! - `INTRINIO_BACKOFF_MS`: Comma-separated retry delays (default: 0,100,500,1000,2000,5000)
//! - `INTRINIO_HEARTBEAT_INTERVAL_SECS`: Keep-alive interval (default: 3)
//! - `RUST_LOG`: Log filter (default: `intrinio_realtime=info`)

use std::time::Duration;

use intrinio_realtime::domain::subscription::LOBBY;
use intrinio_realtime::{ClientConfig, build_client, get_metrics_handle, init_metrics};
use tokio::signal;

/// How often the current state is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let mut config = ClientConfig::from_env()?;
    if config.channels.is_empty() {
        config.channels.push(LOBBY.to_string());
    }

    let client = build_client(&config)?;

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder not installed");
    }

    tracing::info!(
        provider = %config.provider,
        channels = ?config.channels,
        trades_only = config.trades_only,
        "Starting Intrinio realtime client"
    );

    client.on_trade(|trade| {
        tracing::info!(
            symbol = %trade.symbol,
            price = trade.price,
            size = trade.size,
            total_volume = trade.total_volume,
            time = %trade.time().to_rfc3339(),
            "Trade"
        );
    });
    client.on_quote(|quote| {
        tracing::info!(
            symbol = %quote.symbol,
            side = quote.quote_type.as_str(),
            price = quote.price,
            size = quote.size,
            time = %quote.time().to_rfc3339(),
            "Quote"
        );
    });
    client.on_error(|e| tracing::warn!(error = %e, "Feed error"));

    client.connect()?;

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    let shutdown = await_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = status.tick() => {
                let channels = client.channels().await?;
                tracing::info!(
                    state = %client.state(),
                    desired = channels.desired.len(),
                    joined = channels.joined.len(),
                    "Client status"
                );
                if let Some(handle) = get_metrics_handle() {
                    tracing::debug!(metrics = %handle.render(), "Metrics snapshot");
                }
            }
        }
    }

    client.disconnect().await;

    if let Some(handle) = get_metrics_handle() {
        tracing::info!(metrics = %handle.render(), "Final metrics");
    }
    tracing::info!("Intrinio realtime client stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, disconnecting");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, disconnecting");
        }
    }
}

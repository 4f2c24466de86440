//! Crypto Stream Binary
//!
//! Streams Alpaca crypto market data and logs every event.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin crypto-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALPACA_KEY` (or `API_KEY`): Alpaca API key
//! - `ALPACA_SECRET` (or `SECRET_KEY`): Alpaca API secret
//!
//! ## Optional
//! - `CRYPTO_WS_URL`: Feed endpoint (default: `wss://stream.data.alpaca.markets/v1beta3/crypto/us`)
//! - `CRYPTO_SYMBOLS`: Comma-separated pairs (default: `BTC/USD,ETH/USD`)
//! - `CRYPTO_STREAMS`: Comma-separated streams (default: `trades,quotes,bars`)
//! - `STREAM_HEARTBEAT_INTERVAL_SECS`: Ping interval (default: 20)
//! - `STREAM_SILENCE_WINDOW_SECS`: Inbound silence before reconnecting (default: 60)
//! - `STREAM_CONNECT_TIMEOUT_SECS`: Handshake timeout (default: 10)
//! - `STREAM_RECONNECT_DELAY_INITIAL_MS`: First backoff delay (default: 1000)
//! - `STREAM_RECONNECT_DELAY_MAX_SECS`: Backoff cap (default: 30)
//! - `STREAM_RECONNECT_DELAY_MULTIPLIER`: Backoff factor (default: 2.0)
//! - `STREAM_RECONNECT_JITTER`: Jitter fraction (default: 0.1)
//! - `STREAM_MAX_RECONNECT_ATTEMPTS`: 0 retries forever (default: 0)
//! - `STREAM_MAX_AUTH_FAILURES`: 0 retries forever (default: 3)
//! - `STREAM_HEALTH_PORT`: Health and metrics port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: `crypto_stream=info`)

use std::sync::Arc;

use anyhow::Context;
use crypto_stream::infrastructure::alpaca::{
    StreamClient, StreamClientConfig, StreamEvent, WsTransport,
};
use crypto_stream::infrastructure::health::{HealthServer, HealthServerState};
use crypto_stream::infrastructure::telemetry;
use crypto_stream::{
    CredentialProvider, EnvCredentialProvider, HandlerRegistry, LatestPrices, LoggingHandler,
    MetricsHandler, StreamSettings, init_metrics,
};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Crypto Stream");

    init_metrics().context("failed to install metrics recorder")?;

    let settings = StreamSettings::from_env()?;
    log_settings(&settings);

    let credentials = EnvCredentialProvider::new().load_credentials()?;

    let shutdown_token = CancellationToken::new();

    let prices = Arc::new(LatestPrices::new());
    let registry = HandlerRegistry::new()
        .register("log", Arc::new(LoggingHandler))
        .register("prices", prices.clone())
        .register("metrics", Arc::new(MetricsHandler))
        .register_feed_error_handler("log", Arc::new(LoggingHandler));

    let client = StreamClient::start(
        StreamClientConfig::from_settings(&settings),
        WsTransport::new(settings.connect_timeout),
        credentials,
        settings.initial_subscriptions(),
        registry,
    )?;

    tokio::spawn(log_status_events(client.subscribe_status()));

    if settings.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            client.state_watch(),
            Arc::clone(client.subscriptions()),
        ));
        let health_server =
            HealthServer::new(settings.health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    tracing::info!("Crypto stream ready");

    let mut state = client.state_watch();
    tokio::select! {
        () = await_shutdown() => {}
        () = wait_closed(&mut state) => {
            tracing::warn!("Stream client ended on its own");
        }
    }

    shutdown_token.cancel();
    let result = client.stop().await;

    log_price_summary(&prices);
    tracing::info!("Crypto stream stopped");
    result.map_err(Into::into)
}

/// Log the parsed configuration.
fn log_settings(settings: &StreamSettings) {
    let symbols: Vec<&str> = settings.symbols.iter().map(|s| s.as_str()).collect();
    let streams: Vec<&str> = settings.streams.iter().map(|k| k.as_str()).collect();
    tracing::info!(
        symbols = ?symbols,
        streams = ?streams,
        health_port = settings.health_port,
        "Configuration loaded"
    );
    tracing::debug!(endpoint = %settings.ws_url, "WebSocket endpoint");
}

/// Log the last price seen for every pair.
fn log_price_summary(prices: &LatestPrices) {
    let book = prices.snapshot();
    tracing::info!(
        pairs = book.prices.len(),
        updates = book.updates,
        "Session summary"
    );
    for (symbol, price) in &book.prices {
        tracing::info!(%symbol, %price, "Latest price");
    }
}

/// Log lifecycle events from the stream client.
async fn log_status_events(mut rx: broadcast::Receiver<StreamEvent>) {
    loop {
        match rx.recv().await {
            Ok(StreamEvent::Backoff { attempt, delay }) => {
                tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting");
            }
            Ok(StreamEvent::Fatal(error)) => {
                tracing::error!(error = %error, "Stream client gave up");
            }
            Ok(event) => tracing::debug!(?event, "Stream event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Status events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolve once the client reaches `Closed`.
async fn wait_closed(state: &mut tokio::sync::watch::Receiver<crypto_stream::ConnectionState>) {
    if state
        .wait_for(crypto_stream::ConnectionState::is_terminal)
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

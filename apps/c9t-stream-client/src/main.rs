//! C9T Stream Client Binary
//!
//! Connects to the socket service, tails the configured topics into the log
//! and reconnects until interrupted.
//!
//! # Usage
//!
//! ```bash
//! C9T_KEY=... C9T_TOPICS=balances,positions cargo run --bin c9t-stream-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `C9T_KEY`: API key
//!
//! ## Optional
//! - `C9T_SECRET`: base64 signing secret (public connection when unset)
//! - `C9T_HOST`: socket endpoint (default: `wss://sockets.cloud9trader.com`)
//! - `C9T_TOPICS`: comma-separated topics to tail
//! - `C9T_REQUEST_TIMEOUT_MS` / `C9T_SUBMIT_TIMEOUT_MS`: call deadlines
//! - `C9T_AUTO_SUBSCRIBED`: topics pushed without subscribe frames
//! - `C9T_PING_INTERVAL_SECS`: keep-alive interval, `0` disables
//! - `C9T_RECONNECT_JITTER`: jitter fraction on reconnect delays
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: `c9t_stream_client=info`)

use anyhow::Context;
use c9t_stream_client::infrastructure::metrics::describe_metrics;
use c9t_stream_client::infrastructure::telemetry;
use c9t_stream_client::{ClientConfig, ERROR, Handler, STATUS, StreamClient, spawn_client};
use serde_json::Value;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();
    describe_metrics();

    tracing::info!("Starting C9T stream client");

    let config = ClientConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let client = spawn_client(&config).context("building handshake")?;
    attach_logging(&client, &config.topics);
    client.start();

    await_shutdown().await?;

    client.shutdown();
    client.closed().await;
    tracing::info!("Stream client stopped");
    Ok(())
}

/// Log lifecycle events and tail each topic.
fn attach_logging(client: &StreamClient, topics: &[String]) {
    client.on(
        STATUS,
        Handler::new(|args| {
            let status = args.first().and_then(Value::as_str).unwrap_or("unknown");
            tracing::info!(status, "Connection status");
        }),
    );

    client.on(
        ERROR,
        Handler::new(|args| {
            let message = args.first().and_then(Value::as_str).unwrap_or("unknown error");
            tracing::error!(message, "Socket error");
        }),
    );

    for topic in topics {
        let name = topic.clone();
        client.subscribe(
            topic,
            Handler::new(move |args| {
                tracing::info!(topic = %name, payload = %serde_json::Value::from(args.to_vec()), "Push");
            }),
        );
    }
}

/// Load .env from the current directory or any ancestor.
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

fn log_config(config: &ClientConfig) {
    tracing::info!(
        host = %config.host,
        private = config.secret.is_some(),
        topics = ?config.topics,
        "Configuration loaded"
    );
    tracing::debug!(config = ?config, "Full configuration");
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown() -> anyhow::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?;
        tokio::select! {
            result = ctrl_c => {
                result.context("installing Ctrl+C handler")?;
                tracing::info!("Received Ctrl+C, shutting down");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("installing Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

//! Replay Server Binary
//!
//! Serves recorded session replays over HTTP and WebSocket.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin replay-server
//! ```
//!
//! # Environment Variables
//!
//! - `REPLAY_BIND_HOST`: Bind address (default: 0.0.0.0)
//! - `REPLAY_API_PORT`: Control API and WebSocket port (default: 8000)
//! - `REPLAY_HEALTH_PORT`: Health check and metrics port (default: 8082)
//! - `REPLAY_DATA_DIR`: Directory of `<session_id>.json` documents (default: ./data/sessions)
//! - `REPLAY_WINDOW_SECS`: Window size (default: 300)
//! - `REPLAY_PREFETCH_THRESHOLD`: Window fraction that triggers prefetch (default: 0.8)
//! - `REPLAY_PAUSE_POLL_MS`: Pause re-check interval (default: 500)
//! - `REPLAY_SEEK_CONTEXT_SECS`: Pre-context loaded before a seek target (default: 30)
//! - `REPLAY_SUBSCRIBER_QUEUE`: Per-subscriber queue capacity (default: 1024)
//! - `REPLAY_SEND_TIMEOUT_MS`: Per-send timeout before eviction (default: 2000)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: Span export
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use replay_server::infrastructure::telemetry;
use replay_server::{
    ApiServer, AppState, BroadcastPort, ChannelHub, EventStore, HealthServer, HealthServerState,
    JsonDirEventStore, ReplayService, ServiceConfig, SharedClock, SystemClock, init_metrics,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting replay server");

    let _metrics_handle = init_metrics();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let clock: SharedClock = Arc::new(SystemClock);
    let store: Arc<dyn EventStore> =
        Arc::new(JsonDirEventStore::new(&config.data_dir, Arc::clone(&clock)));
    if let Err(error) = store.ping().await {
        tracing::warn!(data_dir = %config.data_dir.display(), error = %error, "Session directory not readable yet");
    }

    let hub = Arc::new(ChannelHub::new(config.broadcast));
    let port: Arc<dyn BroadcastPort> = hub.clone();
    let service = Arc::new(ReplayService::new(
        store,
        port,
        clock,
        config.replay.clone(),
    ));

    let api_addr = SocketAddr::new(config.server.bind_host, config.server.api_port);
    let api_server = ApiServer::new(
        api_addr,
        AppState::new(
            Arc::clone(&service),
            Arc::clone(&hub),
            shutdown_token.clone(),
        ),
    );

    let health_addr = SocketAddr::new(config.server.bind_host, config.server.health_port);
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&service),
        Arc::clone(&hub),
    ));
    let health_server = HealthServer::new(health_addr, health_state, shutdown_token.clone());

    let api_task = spawn_server("API", shutdown_token.clone(), api_server.run());
    let health_task = spawn_server("Health", shutdown_token.clone(), health_server.run());

    tracing::info!("Replay server ready");

    await_shutdown(&shutdown_token).await;

    service.shutdown().await;
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = tokio::join!(api_task, health_task);
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Servers did not stop before the shutdown timeout"
        );
    }

    tracing::info!("Replay server stopped");
    Ok(())
}

/// Run a server; a fatal server error shuts the whole process down.
fn spawn_server<E>(
    name: &'static str,
    shutdown_token: CancellationToken,
    server: impl Future<Output = Result<(), E>> + Send + 'static,
) -> JoinHandle<()>
where
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(server = name, error = %e, "Server error");
            shutdown_token.cancel();
        }
    })
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        bind_host = %config.server.bind_host,
        api_port = config.server.api_port,
        health_port = config.server.health_port,
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );
    tracing::debug!(
        window_secs = config.replay.window_size.as_secs(),
        prefetch_threshold = config.replay.prefetch_threshold,
        pause_poll_ms = u64::try_from(config.replay.pause_poll.as_millis()).unwrap_or(u64::MAX),
        seek_context_secs = config.replay.seek_context.as_secs(),
        subscriber_queue = config.broadcast.subscriber_queue,
        "Replay settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
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

/// Wait for SIGINT, SIGTERM, or a server failure, then cancel the token.
async fn await_shutdown(shutdown_token: &CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(error = %error, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "SIGTERM handler unavailable");
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
        () = shutdown_token.cancelled() => {
            tracing::warn!("Server failure, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::Uri, routing::get, Router};
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatehouse::config::{GatehouseConfig, LoggingConfig, RateLimitingConfig};
use gatehouse::domain::DomainError;
use gatehouse::http::{build_router, AdmissionState, ApiError, HttpServer};
use gatehouse::ratelimit::{open_store, CounterStore, RateLimiter};

/// First delay between store connection attempts.
const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(500);
/// Longest delay between store connection attempts.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Rate-limited request admission in front of an HTTP API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Override the counter store URL
    #[arg(long)]
    store_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = GatehouseConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(url) = args.store_url {
        config.rate_limiting.store_url = Some(url);
    }

    init_tracing(&config.logging);

    info!("Starting Gatehouse");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        limit = config.rate_limiting.limit,
        window_seconds = config.rate_limiting.window_seconds,
        failure_mode = ?config.rate_limiting.failure_mode,
        "Configuration loaded"
    );

    let state = AdmissionState::from_config(&config.rate_limiting, None);
    let connector = match config.rate_limiting.store_url.clone() {
        Some(url) => Some(tokio::spawn(attach_store(
            url,
            config.rate_limiting.clone(),
            state.clone(),
        ))),
        None => {
            info!("No counter store configured, rate limiting disabled");
            None
        }
    };

    let downstream = Router::new()
        .route("/healthz", get(healthz))
        .fallback(unknown_route);
    let router = build_router(downstream, state);

    HttpServer::new(config.server.http_addr, router)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    if let Some(store) = finish_connector(connector).await {
        if let Err(e) = store.close().await {
            warn!(error = %e, "Failed to close counter store");
        }
    }

    info!("Gatehouse stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Connect to the counter store, retrying with backoff until it answers,
/// then start enforcing. Requests are admitted without limits meanwhile.
async fn attach_store(
    url: String,
    config: RateLimitingConfig,
    state: AdmissionState,
) -> Arc<dyn CounterStore> {
    let mut delay = RECONNECT_INITIAL_DELAY;
    loop {
        match open_store(&url, config.connect_timeout()).await {
            Ok(store) => {
                state.install_limiter(RateLimiter::from_config(store.clone(), &config));
                return store;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Counter store unreachable, rate limiting disabled until it answers"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
            }
        }
    }
}

/// Stop the connection task; returns the store if it had connected.
async fn finish_connector(
    connector: Option<JoinHandle<Arc<dyn CounterStore>>>,
) -> Option<Arc<dyn CounterStore>> {
    let connector = connector?;
    if !connector.is_finished() {
        connector.abort();
        return None;
    }
    match connector.await {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Counter store connection task failed");
            None
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn unknown_route(uri: Uri) -> ApiError {
    DomainError::not_found("Ruta", Some(uri.path())).into()
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

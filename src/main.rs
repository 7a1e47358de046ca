use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::Error as DotenvError;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scalewatch::app::AppContext;
use scalewatch::backend::{HttpBackend, MetricsBackend};
use scalewatch::{config, http, metrics, poller, state};

#[derive(Debug, Parser)]
#[command(author, version, about = "scalewatch: database fleet capacity monitor")]
struct Cli {
    /// Path to YAML configuration file. Defaults to env SCALEWATCH_CONFIG or built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    let bind_addr: SocketAddr = config
        .http
        .bind
        .parse()
        .context("invalid http.bind address")?;

    let metrics = metrics::AppMetrics::new()?;
    let state = state::SharedState::new();
    let http_backend = HttpBackend::new(config.backend.base_url.clone());
    info!(base_url = http_backend.base_url(), "using metrics API");
    let backend: Arc<dyn MetricsBackend> = Arc::new(http_backend);

    let poll_interval =
        poller::resolve_interval(backend.as_ref(), config.polling.default_interval).await;

    let ctx = AppContext::new(config, backend, metrics, state, poll_interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_handle =
        poller::spawn_refresh_loop(ctx.refresh.clone(), poll_interval, shutdown_rx);
    let router = http::create_router(ctx);

    info!("scalewatch listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("failed to bind HTTP listener")?;

    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = ?err, "server terminated with error");
    }

    let _ = shutdown_tx.send(true);
    if let Err(err) = refresh_handle.await {
        warn!(error = ?err, "refresh loop did not stop cleanly");
    }

    Ok(())
}

fn load_env() {
    if let Err(err) = dotenvy::dotenv() {
        match err {
            DotenvError::Io(io_err) if io_err.kind() == ErrorKind::NotFound => {}
            other => eprintln!("warning: failed to load .env file: {other}"),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scalewatch=info,axum::rejection=trace"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = ?err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

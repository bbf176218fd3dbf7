//! inferno-poison - Main entry point
//!
//! Loads configuration, prepares the buffer pools and Markov model, then serves the
//! poisoning API until Ctrl+C or SIGTERM.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use inferno_common::config::resolve_config;
use inferno_poison::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for inferno-poison
#[derive(Parser, Debug)]
#[command(name = "inferno-poison")]
#[command(about = "Content poisoning service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "INFERNO_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "INFERNO_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(short, long, env = "INFERNO_BIND")]
    bind: Option<String>,

    /// Root directory for the buffer pools (overrides the config file)
    #[arg(short, long, env = "INFERNO_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// Create missing pool directories instead of refusing to start
    #[arg(long)]
    init_storage: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = resolve_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(root) = args.storage_root {
        config.storage.root = root;
    }

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("inferno_poison={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting inferno-poison v{}", env!("CARGO_PKG_VERSION"));
    info!("Storage root: {}", config.storage.root.display());

    if args.init_storage {
        config
            .storage
            .ensure_directories()
            .context("Failed to create pool directories")?;
    }

    let state = AppState::from_config(&config).context("Failed to open buffer pools")?;
    state.initialize().context("Failed to initialize buffers")?;

    let app = build_router(state.clone());

    let addr = listen_addr(&config.server.bind_address, config.server.port)?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Socket address for a bare IPv4 or IPv6 bind address
fn listen_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = bind
        .trim()
        .parse()
        .with_context(|| format!("Invalid bind address {}", bind))?;
    Ok(SocketAddr::new(ip, port))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

//! Faucet service binary

use clap::Parser;
use lume_faucet::{api, FaucetConfig, FaucetDatabase, FaucetService, HttpRpcClient, Strategy};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server listen address
    #[arg(long)]
    server_addr: Option<String>,

    /// Chain RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Faucet signing key (hex)
    #[arg(long)]
    private_key: Option<String>,

    /// Disbursement strategy (transfer | voucher)
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Amount granted per claim (in wei)
    #[arg(long)]
    dispense_amount: Option<String>,

    /// Rate limit window (seconds)
    #[arg(long)]
    rate_limit_window: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = if args.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lume Faucet v{}", env!("CARGO_PKG_VERSION"));

    let mut config = FaucetConfig::from_env();

    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }
    if let Some(rpc_url) = args.rpc_url {
        config.rpc_url = rpc_url;
    }
    if let Some(key) = args.private_key {
        config.private_key = key;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(amount) = args.dispense_amount {
        config.dispense_amount = amount;
    }
    if let Some(window) = args.rate_limit_window {
        config.rate_limit_window_secs = window;
    }

    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  RPC URL: {}", config.rpc_url);
    info!("  Chain id: {}", config.chain_id);
    info!("  Strategy: {:?}", config.strategy);
    info!("  Dispense amount: {} wei", config.dispense_amount);
    info!(
        "  Rate limit: {} requests / {}s per origin",
        config.max_requests_per_window, config.rate_limit_window_secs
    );

    let database = FaucetDatabase::new(&config.db_path)?;
    info!(
        "Database initialized at: {} ({} claims recorded)",
        config.db_path,
        database.claim_count()
    );

    let rpc = Arc::new(HttpRpcClient::new(config.rpc_url.clone(), config.rpc_timeout())?);
    let service = Arc::new(FaucetService::new(config.clone(), database, rpc)?);
    info!("Faucet service initialized");

    let app = api::router(service);

    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

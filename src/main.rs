use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rolodex::api::rate_limit::spawn_cleanup_task;
use rolodex::config::Config;
use rolodex::AppState;

#[derive(Parser, Debug)]
#[command(name = "rolodex")]
#[command(author, version, about = "A contact book REST service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "rolodex.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rolodex v{}", env!("CARGO_PKG_VERSION"));

    let db = rolodex::db::init(&config.database.path, config.database.max_connections).await?;

    let state = Arc::new(AppState::new(config, db)?);
    tracing::info!(
        "Signing tokens with {:?}, avatars via {}, email {}",
        state.signer.algorithm(),
        state.image_host.name(),
        if state.mailer.is_enabled() { "enabled" } else { "disabled" }
    );

    if state.config.rate_limit.enabled {
        spawn_cleanup_task(
            state.rate_limiter.clone(),
            state.config.rate_limit.cleanup_interval,
        );
    }

    let app = rolodex::api::create_router(state.clone());

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

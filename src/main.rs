mod aggregation;
mod config;
mod credentials;
mod dashboard;
mod error;
mod progress;
mod rounds;
mod routes;
mod server;
mod state;
mod testpad;
mod traversal;

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::{CliArgs, DashboardConfig};
use credentials::CredentialProvider;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Initialize tracing, optionally teeing into a daily log file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "testpad_rounds=info,tower_http=info".into());
    let (file_layer, _log_guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "testpad-rounds.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    info!("Starting testpad-rounds v{}", env!("CARGO_PKG_VERSION"));
    info!("Testpad API: {}", args.api_base);

    let config = DashboardConfig::from_args(args);
    let port = config.port;
    info!("Credentials file: {:?}", config.credentials_file);

    let state = Arc::new(AppState::new(config)?);
    if state.credentials.get().is_some() {
        info!("Using stored Testpad API key");
    } else {
        info!("No Testpad API key stored yet, POST /connect to add one");
    }

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Dashboard API listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("testpad-rounds shutting down");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");

    // Let a running round stop at its next script boundary
    let round = state.round.read().await;
    if let Some(tx) = &round.stop_tx {
        info!("Cancelling running test round");
        let _ = tx.send(true);
    }
}

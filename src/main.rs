//! Intake HTTP server
//!
//! Starts an Axum web server that persists ingested requests to PostgreSQL
//! and exposes health probes and Prometheus metrics.

use clap::Parser;
use intake::{app, cli::Cli, config::Config, handlers::AppState, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from the environment, then apply CLI overrides
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(log_level) = cli.log_level {
        config.observability.log_level = log_level;
    }

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        backend = %config.server.backend_name,
        "Starting intake server on {}:{}",
        config.server.host,
        config.server.port
    );

    // Build application state (instruments + lazily-connecting pool) and router
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));
    let state = AppState::new(Arc::new(config))?;
    let router = app::build_router(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Metrics available at http://{}/metrics", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

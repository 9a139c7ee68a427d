use anyhow::{Context, Result};
use outpost::api::{create_router, WsAppState};
use outpost::config;
use outpost::service::Services;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outpost=info".into()),
        )
        .init();

    info!("Outpost starting...");

    let config = config::load_from_env()?;
    info!(
        bind_addr = %config.server.bind_addr,
        broadcast_capacity = config.broadcast.channel_capacity,
        command_timeout_secs = config.buildings.command_timeout_seconds,
        "Configuration loaded"
    );

    let services = Services::new(&config.buildings);
    let state = WsAppState::new(services, config.broadcast.channel_capacity);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Outpost stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

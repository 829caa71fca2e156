//! Gatherly API Server
//!
//! Main entry point for the event registration upload service.

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatherly_api::{AppState, create_router, spawn_session_sweeper};
use gatherly_core::UploadProviders;
use gatherly_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatherly=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    let providers = UploadProviders::from_settings(&config.uploads);
    if config.uploads.strict_mode {
        info!("Strict mode enabled, credential failures are reported as errors");
    } else {
        warn!("Credential failures will be masked with demo outcomes");
    }

    let state = AppState::with_providers(providers, config.uploads);
    spawn_session_sweeper(state.clone());
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

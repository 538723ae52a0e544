//! Murmur Server - Main Entry Point

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mm_server::{
    api, chat,
    chat::MediaUploader,
    config, db,
    moderation::ProfanityFilter,
    presence::LocalPresence,
    ws::Fanout,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mm_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Murmur Server"
    );

    // Initialize store
    let store = db::create_store(&config).await?;
    info!(backend = store.backend(), "Store ready");

    let filter = ProfanityFilter::new(&config.profanity_extra_words)
        .context("Failed to build profanity filter")?;

    // Image uploads are disabled unless object storage is reachable
    let uploader: Option<Arc<dyn MediaUploader>> = if config.s3_endpoint.is_some()
        || std::env::var("AWS_ACCESS_KEY_ID").is_ok()
    {
        let client = chat::S3Client::new(&config);
        match client.health_check().await {
            Ok(()) => {
                info!(bucket = %client.bucket(), "S3 storage connected");
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!("S3 health check failed: {}. Image uploads disabled.", e);
                None
            }
        }
    } else {
        info!("S3 not configured, image uploads disabled");
        None
    };

    let fanout = Arc::new(Fanout::new(Arc::new(LocalPresence::new())));

    // Build application state
    let state = api::AppState::new(store, fanout, filter, uploader, config.clone());

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

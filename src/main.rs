//! Main entry point for the Canvas AI Service

use canvas_ai_service::{
    api,
    backend::{CandleLoader, ModelRegistry},
    config::{LoggingConfig, Settings},
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    settings.validate()?;
    init_tracing(&settings.logging);

    info!("Starting Canvas AI Service");
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        text2img = %settings.models.text2img.model_id,
        sam = %settings.models.sam.model_type,
        max_concurrent = settings.inference.max_concurrent,
        "Loaded configuration"
    );

    let loader = CandleLoader::new(settings.models.clone(), settings.device.clone());
    let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));

    if settings.models.preload {
        let registry = registry.clone();
        tokio::spawn(async move { registry.preload_all().await });
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app_state = Arc::new(AppState::new(settings, registry));

    if let Some(store) = &app_state.store {
        store.ensure_storage_dir().await?;
    }

    let app = api::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod storage;
pub mod validation;

use crate::state::AppState;
use anyhow::{Context, Result};
use demix_core::Config;
use demix_processing::SeparationPipeline;
use std::sync::Arc;

/// Assemble the application: validate configuration, initialize tracing,
/// connect storage, wire the separation pipeline and build the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    validation::validate_config(&config).context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.is_production());
    tracing::info!(environment = %config.environment, "Configuration loaded and validated");

    let storage = storage::setup_storage(&config).await?;

    let pipeline = SeparationPipeline::from_config(&config, storage.clone())
        .context("Failed to initialize separation pipeline")?;

    let state = Arc::new(AppState::new(config, storage, pipeline));
    let router = routes::setup_routes(state.clone())?;

    Ok((state, router))
}

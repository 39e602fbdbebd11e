//! Route configuration and setup

use crate::api_doc::openapi_json;
use crate::constants::{DOWNLOAD_STEM_PATH, OPENAPI_PATH, SEPARATE_PATH};
use crate::handlers;
use crate::middleware::{error_details_middleware, request_id_middleware};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use demix_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing and the text fields around the audio part.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the router with all routes and middleware.
pub fn setup_routes(state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let config = state.config.clone();
    let cors = setup_cors(&config)?;

    tracing::info!(
        http_concurrency_limit = config.http_concurrency_limit,
        "HTTP concurrency limit layer enabled"
    );

    let app = Router::new()
        .route(SEPARATE_PATH, post(handlers::separate::separate))
        .route(&format!("{}/", SEPARATE_PATH), post(handlers::separate::separate))
        .route(
            &format!("{}/{{*file_url}}", DOWNLOAD_STEM_PATH),
            get(handlers::download_stem::download_stem),
        )
        .route("/live", get(handlers::health::liveness_check))
        .route("/health", get(handlers::health::health_check))
        .route(OPENAPI_PATH, get(openapi_json))
        .merge(utoipa_rapidoc::RapiDoc::new(OPENAPI_PATH).path("/docs"))
        .layer(axum::middleware::from_fn_with_state(
            config.is_production(),
            error_details_middleware,
        ))
        .layer(ConcurrencyLimitLayer::new(config.http_concurrency_limit.max(1)))
        .layer(RequestBodyLimitLayer::new(
            config
                .max_audio_size_bytes
                .saturating_add(MULTIPART_OVERHEAD_BYTES),
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        if config.is_production() {
            anyhow::bail!("CORS_ORIGINS cannot be '*' in production");
        }
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new().allow_origin(origins)
    };

    Ok(cors
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

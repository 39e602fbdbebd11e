//! OpenAPI documentation.

use axum::Json;
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use crate::utils::upload::SeparateForm;
use demix_core::{SeparationMode, SeparationResponse, Stem};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Demix API",
        version = "0.1.0",
        description = "Music stem separation: upload a track or pass a link, receive download URLs for the separated stems."
    ),
    paths(
        handlers::separate::separate,
        handlers::download_stem::download_stem,
        handlers::health::liveness_check,
        handlers::health::health_check,
    ),
    components(schemas(
        SeparateForm,
        SeparationResponse,
        SeparationMode,
        Stem,
        ErrorResponse,
        handlers::health::HealthResponse,
    )),
    tags(
        (name = "separation", description = "Stem separation and stem downloads"),
        (name = "health", description = "Liveness and dependency health"),
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

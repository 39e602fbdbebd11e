use crate::constants::SEPARATION_COMPLETE_MESSAGE;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use crate::utils::ssrf_validation::validate_link;
use crate::utils::upload::{read_separate_request, SeparateForm};
use axum::{
    extract::{Request, State},
    Json,
};
use demix_core::{AppError, SeparationResponse};
use demix_processing::AudioInput;
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/api/separate",
    tag = "separation",
    request_body(
        content = SeparateForm,
        content_type = "multipart/form-data",
        description = "Either a `file` part (wav or mp3) or a `link` field, plus an optional `mode`. \
                       `application/x-www-form-urlencoded` is accepted for link requests."
    ),
    responses(
        (status = 200, description = "Stems separated and stored", body = SeparationResponse),
        (status = 400, description = "Missing or invalid input", body = ErrorResponse),
        (status = 413, description = "Audio exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Separation or stem upload failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "separate"))]
pub async fn separate(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SeparationResponse>, HttpAppError> {
    let form = read_separate_request(request, state.config.max_audio_size_bytes).await?;

    let input = form
        .input
        .ok_or_else(|| AppError::InvalidInput("No audio file or link provided".to_string()))?;

    if let AudioInput::Link(link) = &input {
        validate_link(
            link,
            state.config.url_allow_private_hosts,
            state.config.url_upload_allowlist.as_deref(),
        )
        .await
        .map_err(AppError::InvalidInput)?;
    }

    tracing::info!(mode = %form.mode, link = input.is_link(), "Separation requested");

    let outcome = state.pipeline.run(input, form.mode).await?;

    Ok(Json(SeparationResponse {
        message: SEPARATION_COMPLETE_MESSAGE.to_string(),
        downloads: outcome.downloads,
        processing_time: outcome.processing_time,
        separation_time: outcome.separation_time,
        original_file: outcome.original_file,
    }))
}

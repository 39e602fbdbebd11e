use crate::constants::STEM_DOWNLOAD_CONTENT_TYPE;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Response, StatusCode},
};
use demix_core::AppError;
use futures::StreamExt;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/download_stem/{file_url}",
    tag = "separation",
    params(
        ("file_url" = String, Path, description = "Object URL returned in `downloads`, or a bare storage key")
    ),
    responses(
        (status = 200, description = "Stem file", content_type = "audio/mpeg"),
        (status = 400, description = "Malformed key", body = ErrorResponse),
        (status = 403, description = "URL points outside the configured bucket", body = ErrorResponse),
        (status = 404, description = "Object not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "download_stem"))]
pub async fn download_stem(
    State(state): State<Arc<AppState>>,
    Path(file_url): Path<String>,
) -> Result<Response<Body>, HttpAppError> {
    let key = state.storage.resolve_url(&file_url)?;
    let filename = attachment_name(&key);

    tracing::debug!(storage_key = %key, "Proxying stem from storage");

    let stream = state.storage.download_stream(&key).await?;
    let body_stream = stream.map(|result| {
        result.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
    });

    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, STEM_DOWNLOAD_CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, content_disposition.as_str())
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Last key segment, safe to embed in a quoted header parameter.
fn attachment_name(key: &str) -> String {
    let base = key.rsplit('/').next().unwrap_or(key);
    let name: String = base
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "stem.mp3".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_name_is_last_segment() {
        assert_eq!(attachment_name("stems/vocals_abc_song.mp3"), "vocals_abc_song.mp3");
        assert_eq!(attachment_name("stems/we\"ird name.mp3"), "we_ird_name.mp3");
        assert_eq!(attachment_name("stems/"), "stem.mp3");
    }
}

use crate::error::ErrorResponse;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Strip `details` and `error_type` from error bodies when `hide_details` is set.
///
/// Installed with `Config::is_production()` as its state.
pub async fn error_details_middleware(
    State(hide_details): State<bool>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !hide_details {
        return response;
    }

    let redacted = match response.extensions().get::<ErrorResponse>() {
        Some(body) if body.has_details() => body.clone().without_details(),
        _ => return response,
    };

    let (parts, _) = response.into_parts();
    let mut rebuilt = (parts.status, Json(redacted)).into_response();
    for (name, value) in parts.headers.iter() {
        if name != CONTENT_LENGTH && name != CONTENT_TYPE {
            rebuilt.headers_mut().append(name.clone(), value.clone());
        }
    }
    rebuilt.extensions_mut().extend(parts.extensions);
    rebuilt
}

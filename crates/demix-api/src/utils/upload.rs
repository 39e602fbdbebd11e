//! Separation request form parsing (multipart or urlencoded).

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use bytes::BytesMut;
use demix_core::{AppError, SeparationMode};
use demix_processing::{validate_upload_extension, AudioInput};
use serde::Deserialize;
use utoipa::ToSchema;

/// Form fields of a separation request. Multipart requests may carry a `file`
/// part (wav or mp3) instead of `link`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SeparateForm {
    /// http(s) URL of the audio to fetch
    pub link: Option<String>,
    /// `"2"` (default) for vocals/instrumental, any other value for vocals/drums/bass/other
    pub mode: Option<String>,
}

/// Parsed request. `input` is `None` when neither a file nor a link was sent.
#[derive(Debug)]
pub struct SeparateRequest {
    pub input: Option<AudioInput>,
    pub mode: SeparationMode,
}

/// Read the separation form from either body encoding. Any other content type
/// yields an empty request.
pub async fn read_separate_request(
    request: Request,
    max_file_bytes: usize,
) -> Result<SeparateRequest, AppError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?;
        extract_multipart(multipart, max_file_bytes).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<SeparateForm>::from_request(request, &())
            .await
            .map_err(|e| AppError::InvalidInput(format!("Invalid form body: {}", e)))?;
        Ok(SeparateRequest {
            input: link_input(form.link),
            mode: SeparationMode::from_form_value(form.mode.as_deref()),
        })
    } else {
        Ok(SeparateRequest {
            input: None,
            mode: SeparationMode::default(),
        })
    }
}

async fn extract_multipart(
    mut multipart: Multipart,
    max_file_bytes: usize,
) -> Result<SeparateRequest, AppError> {
    let mut upload: Option<AudioInput> = None;
    let mut link: Option<String> = None;
    let mut mode: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if upload.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple file fields are not allowed; send exactly one field named 'file'"
                            .to_string(),
                    ));
                }
                let filename = field.file_name().unwrap_or_default().trim().to_string();
                if !filename.is_empty() {
                    validate_upload_extension(&filename)
                        .map_err(|e| AppError::UnsupportedFormat(e.to_string()))?;
                }

                let mut data = BytesMut::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))?
                {
                    validate_file_size(data.len() + chunk.len(), max_file_bytes)?;
                    data.extend_from_slice(&chunk);
                }

                if filename.is_empty() {
                    // Browsers send an empty part when no file was chosen.
                    if data.is_empty() {
                        continue;
                    }
                    return Err(AppError::InvalidInput("No selected file".to_string()));
                }

                upload = Some(AudioInput::Upload {
                    filename,
                    data: data.freeze(),
                });
            }
            "link" => link = Some(read_text(field).await?),
            "mode" => mode = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(SeparateRequest {
        input: upload.or_else(|| link_input(link)),
        mode: SeparationMode::from_form_value(mode.as_deref()),
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read form field: {}", e)))
}

fn link_input(link: Option<String>) -> Option<AudioInput> {
    link.map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .map(AudioInput::Link)
}

/// Validate file size
pub fn validate_file_size(file_size: usize, max_size: usize) -> Result<(), AppError> {
    if file_size > max_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File size exceeds maximum allowed size of {} MB",
            max_size / 1024 / 1024
        )));
    }
    Ok(())
}

//! Separation endpoint integration tests.
//!
//! Run with: `cargo test -p demix-api --test separate_test`

mod helpers;

use axum_test::multipart::{MultipartForm, Part};
use helpers::link_server::spawn_link_server;
use helpers::storage::FlakyStorage;
use helpers::{assert_stem_url, setup_test_app, TestAppBuilder};
use serde_json::Value;
use std::sync::Arc;

fn audio_part(name: &str) -> Part {
    Part::bytes(b"ID3 fake mp3 payload".to_vec())
        .file_name(name)
        .mime_type("audio/mpeg")
}

#[tokio::test]
async fn test_upload_separates_into_two_stems() {
    let app = setup_test_app().await;

    let form = MultipartForm::new().add_part("file", audio_part("my song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["message"], "Separation complete");

    let downloads = body["downloads"].as_object().expect("downloads object");
    assert_eq!(downloads.len(), 2);
    assert_stem_url(downloads["vocals"].as_str().unwrap(), "vocals", "my_song.mp3");
    assert_stem_url(
        downloads["instrumental"].as_str().unwrap(),
        "instrumental",
        "my_song.mp3",
    );

    let processing = body["processing_time"].as_f64().unwrap();
    let separation = body["separation_time"].as_f64().unwrap();
    assert!(separation >= 0.0);
    assert!(processing >= separation);
    assert!(body.get("original_file").is_none());

    assert_eq!(app.toolkit.ensure_calls(), 1);
    assert_eq!(app.separator.calls(), 1);
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_uploaded_stems_are_stored() {
    let app = setup_test_app().await;

    let form = MultipartForm::new().add_part("file", audio_part("song.wav"));
    let response = app.client().post("/api/separate").multipart(form).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    let vocals_url = body["downloads"]["vocals"].as_str().unwrap();
    let key = app.storage.resolve_url(vocals_url).expect("URL should resolve");
    assert!(key.starts_with("stems/vocals_"));
    assert!(app.storage.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_any_other_mode_yields_four_stems() {
    let app = setup_test_app().await;

    for mode in ["4", "banana"] {
        let form = MultipartForm::new()
            .add_text("mode", mode)
            .add_part("file", audio_part("track.mp3"));
        let response = app.client().post("/api/separate/").multipart(form).await;

        assert_eq!(response.status_code(), 200, "mode {mode}");
        let body: Value = response.json();
        let downloads = body["downloads"].as_object().unwrap();
        let mut stems: Vec<&str> = downloads.keys().map(String::as_str).collect();
        stems.sort_unstable();
        assert_eq!(stems, vec!["bass", "drums", "other", "vocals"]);
        for stem in &stems {
            assert_stem_url(downloads[*stem].as_str().unwrap(), stem, "track.mp3");
        }
    }
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_link_with_explicit_two_stem_mode() {
    let app = setup_test_app().await;
    let base = spawn_link_server().await;

    let form = MultipartForm::new()
        .add_text("link", format!("{}/a.mp3", base))
        .add_text("mode", "2");
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_stem_url(body["downloads"]["vocals"].as_str().unwrap(), "vocals", "a.mp3");
    assert_stem_url(
        body["downloads"]["instrumental"].as_str().unwrap(),
        "instrumental",
        "a.mp3",
    );
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_urlencoded_link_is_accepted() {
    let app = setup_test_app().await;
    let base = spawn_link_server().await;
    let link = format!("{}/a.mp3", base);

    let response = app
        .client()
        .post("/api/separate/")
        .form(&[("link", link.as_str())])
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["downloads"].as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn test_m4a_link_is_converted_before_separation() {
    let app = setup_test_app().await;
    let base = spawn_link_server().await;

    let form = MultipartForm::new().add_text("link", format!("{}/clip.m4a", base));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_stem_url(body["downloads"]["vocals"].as_str().unwrap(), "vocals", "clip.mp3");
    assert_eq!(
        app.toolkit
            .conversions
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_missing_input_is_rejected_before_any_work() {
    let app = setup_test_app().await;

    let response = app.client().post("/api/separate/").await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "No audio file or link provided");
    assert_eq!(body["code"], "INVALID_INPUT");

    let form = MultipartForm::new().add_text("mode", "4");
    let response = app.client().post("/api/separate/").multipart(form).await;
    assert_eq!(response.status_code(), 400);

    assert_eq!(app.toolkit.ensure_calls(), 0);
    assert_eq!(app.separator.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    let app = setup_test_app().await;

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"not audio".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNSUPPORTED_FORMAT");
    assert_eq!(app.toolkit.ensure_calls(), 0);
    assert_eq!(app.separator.calls(), 0);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_separation_failure_returns_500_and_cleans_up() {
    let app = TestAppBuilder::new().failing_separator().build().await;

    let form = MultipartForm::new().add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["error"], "Separation failed");
    assert_eq!(body["code"], "SEPARATION_FAILED");
    assert!(body.get("uploaded").is_none());
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_separation_failure_includes_details_outside_production() {
    let app = TestAppBuilder::new().failing_separator().build().await;

    let form = MultipartForm::new().add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert!(body["details"].is_string());
    assert_eq!(body["error_type"], "Separation");
}

#[tokio::test]
async fn test_production_config_hides_error_details() {
    let app = TestAppBuilder::new()
        .env("ENVIRONMENT", "production")
        .env("CORS_ORIGINS", "https://app.example.com")
        .failing_separator()
        .build()
        .await;

    let form = MultipartForm::new().add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 500);
    assert!(!response.header("x-request-id").is_empty());
    let body: Value = response.json();
    assert_eq!(body["error"], "Separation failed");
    assert_eq!(body["code"], "SEPARATION_FAILED");
    assert!(body.get("details").is_none());
    assert!(body.get("error_type").is_none());
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_stem_upload_failure_reports_partial_result() {
    let flaky: Arc<std::sync::Mutex<Option<Arc<FlakyStorage>>>> = Default::default();
    let handle = flaky.clone();
    let app = TestAppBuilder::new()
        .wrap_storage(move |inner| {
            let storage = Arc::new(FlakyStorage::permanent(inner, "stems/drums_"));
            *handle.lock().unwrap() = Some(storage.clone());
            storage
        })
        .build()
        .await;

    let form = MultipartForm::new()
        .add_text("mode", "4")
        .add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["code"], "STEM_UPLOAD_FAILED");
    assert_eq!(body["error"], "Failed to upload drums stem");

    let uploaded = body["uploaded"].as_object().expect("partial uploads listed");
    assert_eq!(uploaded.len(), 1);
    assert_stem_url(uploaded["vocals"].as_str().unwrap(), "vocals", "song.mp3");

    let storage = flaky.lock().unwrap().clone().unwrap();
    assert_eq!(storage.attempts(), 1, "non-retryable failure must not be retried");
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_transient_upload_failures_are_retried() {
    let flaky: Arc<std::sync::Mutex<Option<Arc<FlakyStorage>>>> = Default::default();
    let handle = flaky.clone();
    let app = TestAppBuilder::new()
        .wrap_storage(move |inner| {
            let storage = Arc::new(FlakyStorage::transient(inner, "stems/vocals_", 2));
            *handle.lock().unwrap() = Some(storage.clone());
            storage
        })
        .build()
        .await;

    let form = MultipartForm::new().add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let storage = flaky.lock().unwrap().clone().unwrap();
    assert_eq!(storage.attempts(), 3);
}

#[tokio::test]
async fn test_unavailable_toolkit_returns_500() {
    let app = TestAppBuilder::new().toolkit_unavailable().build().await;

    let form = MultipartForm::new().add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["code"], "MEDIA_TOOLKIT_UNAVAILABLE");
    assert_eq!(app.separator.calls(), 0);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn test_unreachable_link_returns_500() {
    let app = setup_test_app().await;
    let base = spawn_link_server().await;

    let form = MultipartForm::new().add_text("link", format!("{}/missing.mp3", base));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUDIO_FETCH_FAILED");
    assert_eq!(app.separator.calls(), 0);
    app.assert_no_local_leftovers();
}

#[tokio::test]
async fn test_private_link_rejected_when_private_hosts_disallowed() {
    let app = TestAppBuilder::new()
        .env("URL_ALLOW_PRIVATE_HOSTS", "false")
        .build()
        .await;

    let form = MultipartForm::new().add_text("link", "http://127.0.0.1:9/a.mp3");
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(app.toolkit.ensure_calls(), 0);
}

#[tokio::test]
async fn test_non_http_link_rejected() {
    let app = setup_test_app().await;

    let form = MultipartForm::new().add_text("link", "file:///etc/passwd");
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(app.separator.calls(), 0);
}

#[tokio::test]
async fn test_original_upload_when_enabled() {
    let app = TestAppBuilder::new()
        .env("UPLOAD_ORIGINAL", "true")
        .build()
        .await;

    let form = MultipartForm::new().add_part("file", audio_part("song.mp3"));
    let response = app.client().post("/api/separate/").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let original = body["original_file"].as_str().expect("original_file present");
    assert!(original.contains("/originals/"));
    assert!(original.ends_with("_song.mp3"));
}

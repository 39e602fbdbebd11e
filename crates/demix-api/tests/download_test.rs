//! Stem download proxy integration tests.
//!
//! Run with: `cargo test -p demix-api --test download_test`

mod helpers;

use helpers::{setup_test_app, TestApp};

const STEM_KEY: &str = "stems/vocals_0123abcd_song.mp3";

async fn store_stem(app: &TestApp) -> String {
    app.storage
        .upload_with_key(STEM_KEY, b"vocals".to_vec(), "audio/mpeg")
        .await
        .expect("Failed to store stem")
}

fn percent_encode(value: &str) -> String {
    value.replace(':', "%3A").replace('/', "%2F")
}

fn assert_stem_response(response: &axum_test::TestResponse) {
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "audio/mpeg");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"vocals_0123abcd_song.mp3\""
    );
    assert_eq!(response.text(), "vocals");
}

#[tokio::test]
async fn test_download_by_object_url() {
    let app = setup_test_app().await;
    let url = store_stem(&app).await;
    assert_eq!(
        url,
        "https://test-bucket.s3.us-east-1.amazonaws.com/stems/vocals_0123abcd_song.mp3"
    );

    let response = app
        .client()
        .get(&format!("/api/download_stem/{}", percent_encode(&url)))
        .await;
    assert_stem_response(&response);
}

#[tokio::test]
async fn test_download_with_collapsed_scheme() {
    let app = setup_test_app().await;
    store_stem(&app).await;

    let response = app
        .client()
        .get("/api/download_stem/https:/test-bucket.s3.us-east-1.amazonaws.com/stems/vocals_0123abcd_song.mp3")
        .await;
    assert_stem_response(&response);
}

#[tokio::test]
async fn test_download_by_bare_key() {
    let app = setup_test_app().await;
    store_stem(&app).await;

    let response = app
        .client()
        .get(&format!("/api/download_stem/{}", STEM_KEY))
        .await;
    assert_stem_response(&response);
}

#[tokio::test]
async fn test_download_missing_object_is_404() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/api/download_stem/stems/vocals_nothing.mp3")
        .await;

    assert_eq!(response.status_code(), 404);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_download_from_foreign_bucket_is_forbidden() {
    let app = setup_test_app().await;
    store_stem(&app).await;

    let foreign = "https://other-bucket.s3.eu-west-1.amazonaws.com/stems/vocals_0123abcd_song.mp3";
    let response = app
        .client()
        .get(&format!("/api/download_stem/{}", percent_encode(foreign)))
        .await;

    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_download_rejects_traversal() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/api/download_stem/stems%2F..%2F..%2Fsecret.mp3")
        .await;

    assert_eq!(response.status_code(), 400);
}

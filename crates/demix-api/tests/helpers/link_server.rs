//! Local HTTP server standing in for remote audio links.

#![allow(dead_code)]

use axum::{http::StatusCode, routing::get, Router};

pub const LINK_AUDIO: &[u8] = b"ID3 remote audio bytes";

/// Serve `/a.mp3`, `/clip.m4a` and a 404 at `/missing.mp3`; returns the base URL.
pub async fn spawn_link_server() -> String {
    let app = Router::new()
        .route("/a.mp3", get(|| async { LINK_AUDIO }))
        .route("/clip.m4a", get(|| async { LINK_AUDIO }))
        .route(
            "/missing.mp3",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind link server");
    let addr = listener.local_addr().expect("Link server has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Link server failed");
    });

    format!("http://{}", addr)
}

//! Shared test harness: a router wired to temp directories and an optional
//! fake transfer engine.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use reelvault::config::Config;
use reelvault::server::{build_router, AppContext};
use reelvault_torrent::TransferEngine;

pub struct TestApp {
    pub ctx: AppContext,
    pub router: Router,
    pub media_dir: PathBuf,
    pub thumb_dir: PathBuf,
    // Held so the directories outlive the test.
    _root: tempfile::TempDir,
}

pub fn test_app(engine: Option<Arc<dyn TransferEngine>>) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let media_dir = root.path().join("media");
    let thumb_dir = root.path().join("thumbs");
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::create_dir_all(&thumb_dir).unwrap();

    let mut config = Config::default();
    config.media.library_dir = media_dir.clone();
    config.media.thumbnail_dir = thumb_dir.clone();
    config.downloads.temp_root = root.path().join("torrents");

    let ctx = AppContext::new(config, engine);
    let router = build_router(ctx.clone());

    TestApp {
        ctx,
        router,
        media_dir,
        thumb_dir,
        _root: root,
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub async fn get(app: &TestApp, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_with_range(
    app: &TestApp,
    uri: &str,
    range: &str,
) -> (StatusCode, HeaderMap, Bytes) {
    send(
        app,
        Request::get(uri)
            .header("Range", range)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, HeaderMap, Bytes) {
    send(
        app,
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn delete(app: &TestApp, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(
        app,
        Request::delete(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

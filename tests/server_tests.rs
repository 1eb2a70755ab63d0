use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use qr_attend_rs::error::ClientError;
use qr_attend_rs::gate::{GateConfig, ScanGate};
use qr_attend_rs::server::router;
use qr_attend_rs::submit::Submitter;
use qr_attend_rs::types::ScanReply;

#[derive(Debug)]
struct AlwaysAna;

#[async_trait]
impl Submitter for AlwaysAna {
    async fn submit(&self, _payload: &str) -> Result<ScanReply, ClientError> {
        Ok(ScanReply {
            name: Some("Ana".into()),
            class: Some("9B".into()),
            nis: Some("001".into()),
        })
    }
}

fn app() -> (ScanGate, Router) {
    let gate = ScanGate::new(
        Arc::new(AlwaysAna),
        GateConfig {
            cooldown: Duration::from_secs(60),
            history_cap: 10,
        },
    );
    let app = router(gate.clone(), "ui-does-not-exist");
    (gate, app)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn decode_once_then_ignored_until_reset() {
    let (gate, app) = app();

    let (status, body) = call(&app, "GET", "/api/gate/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["label"], "Ready to scan");

    let (status, body) = call(&app, "POST", "/api/gate/decode", Some(r#"{"qr":"STUDENT-001"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["entry"]["display_name"], "Ana");
    assert_eq!(body["entry"]["outcome"], "success");

    let (_, body) = call(&app, "POST", "/api/gate/decode", Some(r#"{"qr":"STUDENT-001"}"#)).await;
    assert_eq!(body["outcome"], "ignored");

    let (_, body) = call(&app, "POST", "/api/gate/reset", None).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["last_payload"], "STUDENT-001");

    let (_, history) = call(&app, "GET", "/api/gate/history", None).await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(gate.history().await.len(), 1);
}

#[derive(Debug)]
struct SlowBackend;

#[async_trait]
impl Submitter for SlowBackend {
    async fn submit(&self, _payload: &str) -> Result<ScanReply, ClientError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(ScanReply {
            name: Some("Budi".into()),
            class: Some("10A".into()),
            nis: None,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn dropped_decode_request_still_rearms_gate() {
    let gate = ScanGate::new(
        Arc::new(SlowBackend),
        GateConfig {
            cooldown: Duration::from_millis(500),
            history_cap: 10,
        },
    );
    let app = router(gate.clone(), "ui-does-not-exist");

    let req = Request::builder()
        .method("POST")
        .uri("/api/gate/decode")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"qr":"STUDENT-002"}"#))
        .unwrap();
    // The client disconnects before the backend answers.
    let gone = tokio::time::timeout(Duration::from_millis(10), app.clone().oneshot(req)).await;
    assert!(gone.is_err());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let (_, body) = call(&app, "GET", "/api/gate/status", None).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["history"][0]["display_name"], "Budi");

    let (_, body) = call(&app, "POST", "/api/gate/decode", Some(r#"{"qr":"STUDENT-002"}"#)).await;
    assert_eq!(body["outcome"], "completed");
}

#[tokio::test]
async fn empty_qr_is_rejected() {
    let (gate, app) = app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/gate/decode")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"qr":""}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(gate.history().await.is_empty());
}

#[tokio::test]
async fn camera_toggle_and_miss() {
    let (_gate, app) = app();

    let (_, body) = call(&app, "POST", "/api/gate/camera", None).await;
    assert_eq!(body["camera_active"], true);

    call(&app, "POST", "/api/gate/decode", Some(r#"{"qr":"STUDENT-001"}"#)).await;
    let (status, _) = call(&app, "POST", "/api/gate/miss", Some(r#"{"reason":"NotFoundException"}"#)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&app, "GET", "/api/gate/status", None).await;
    assert_eq!(body["status"], "success");

    let (_, body) = call(&app, "POST", "/api/gate/camera", None).await;
    assert_eq!(body["camera_active"], false);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn api_responses_are_not_cached() {
    let (_gate, app) = app();
    let req = Request::builder()
        .uri("/api/gate/status")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
}

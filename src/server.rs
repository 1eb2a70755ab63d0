use std::path::Path;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{
    services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;

use crate::gate::ScanGate;

#[derive(Clone)]
pub struct AppState {
    gate: ScanGate, // shared with whatever else feeds the gate
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    #[serde(default)]
    pub qr: String,
}

#[derive(Debug, Deserialize)]
pub struct MissRequest {
    #[serde(default)]
    pub reason: String,
}

/// Build the gate API plus a static fallback for the browser-side scanner page.
///
/// - `GET  /api/gate/status`  current snapshot
/// - `GET  /api/gate/history` recent scans, newest first
/// - `POST /api/gate/decode`  `{"qr": "..."}` from the decoder
/// - `POST /api/gate/miss`    per-frame decode miss, ignored
/// - `POST /api/gate/camera`  toggle camera flag
/// - `POST /api/gate/reset`   force the gate back to ready
pub fn router(gate: ScanGate, ui_dir: impl AsRef<Path>) -> Router {
    let state = AppState { gate };

    let api = Router::new()
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/decode", post(post_decode))
        .route("/miss", post(post_miss))
        .route("/camera", post(post_camera))
        .route("/reset", post(post_reset))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state);

    let static_svc = ServeDir::new(ui_dir.as_ref()).append_index_html_on_directories(true);

    Router::new()
        .nest("/api/gate", api)
        .fallback_service(static_svc)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn spawn_server(bind: &str, gate: ScanGate, ui_dir: impl AsRef<Path>) -> Result<()> {
    let app = router(gate, ui_dir);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "gate API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.gate.snapshot().await))
}

async fn get_history(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.gate.history().await))
}

async fn post_decode(
    State(app): State<AppState>,
    Json(req): Json<DecodeRequest>,
) -> impl IntoResponse {
    if req.qr.is_empty() {
        return (StatusCode::BAD_REQUEST, "qr must not be empty").into_response();
    }
    let outcome = app.gate.submit_decode(req.qr).await;
    (StatusCode::OK, Json(outcome)).into_response()
}

async fn post_miss(State(app): State<AppState>, Json(req): Json<MissRequest>) -> impl IntoResponse {
    app.gate.decode_miss(&req.reason);
    StatusCode::NO_CONTENT
}

async fn post_camera(State(app): State<AppState>) -> impl IntoResponse {
    app.gate.toggle_camera().await;
    (StatusCode::OK, Json(app.gate.snapshot().await))
}

async fn post_reset(State(app): State<AppState>) -> impl IntoResponse {
    app.gate.reset().await;
    (StatusCode::OK, Json(app.gate.snapshot().await))
}

//! Control API route definitions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::state::AppState;
use crate::speedtest::TestRequest;
use crate::system;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(node_status))
        .route("/speed-test", post(start_speed_test))
        .route("/speed-test/{id}", get(get_speed_test))
        .route("/speed-tests", get(list_speed_tests))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn node_status(State(state): State<AppState>) -> Json<Value> {
    let status = system::snapshot(&state.config.node, state.started_at);
    Json(json!({ "data": status, "meta": meta() }))
}

/// Accept a test request and return its id immediately. The measurement
/// runs in the background; poll `GET /speed-test/{id}` for the outcome.
///
/// An unknown `type` never reaches the orchestrator: the closed enum
/// rejects it at deserialization and no record is created.
async fn start_speed_test(
    State(state): State<AppState>,
    Json(req): Json<TestRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    match state.orchestrator.start_test(req).await {
        Ok(record) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "data": { "id": record.id }, "meta": meta() })),
        )),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string(), "meta": meta() })),
        )),
    }
}

async fn get_speed_test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.orchestrator.get_result(&id).await {
        Some(record) => Ok(Json(json!({ "data": record, "meta": meta() }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "test not found", "meta": meta() })),
        )),
    }
}

async fn list_speed_tests(State(state): State<AppState>) -> Json<Value> {
    let records = state.orchestrator.list_results().await;
    let total = records.len();
    Json(json!({
        "data": records,
        "meta": { "total": total }
    }))
}

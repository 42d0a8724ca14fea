use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::contracts::CONTRACT_VERSION;
use crate::runtime::Runtime;

pub async fn health(State(_runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "engine": "cortex",
        "contract_version": CONTRACT_VERSION
    }))
}

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::runtime::Runtime;

pub async fn diagnostics(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    Json(runtime.diagnostics())
}

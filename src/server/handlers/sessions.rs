use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::core::errors::EngineError;
use crate::models::TurnEvents;
use crate::runtime::Runtime;

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    pub user_message: String,
    #[serde(default = "default_agent_state")]
    pub agent_state: Value,
}

fn default_agent_state() -> Value {
    Value::Object(serde_json::Map::new())
}

pub async fn commit_turn(
    State(runtime): State<Arc<Runtime>>,
    Path(session_id): Path<String>,
    Json(payload): Json<TurnEvents>,
) -> Result<impl IntoResponse, EngineError> {
    if session_id.trim().is_empty() {
        return Err(EngineError::BadRequest("session_id is empty".to_string()));
    }
    let result = runtime.commit_turn(&session_id, payload).await;
    Ok(Json(result))
}

pub async fn compose_context(
    State(runtime): State<Arc<Runtime>>,
    Path(session_id): Path<String>,
    Json(payload): Json<ComposeRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if session_id.trim().is_empty() {
        return Err(EngineError::BadRequest("session_id is empty".to_string()));
    }
    if payload.user_message.trim().is_empty() {
        return Err(EngineError::BadRequest(
            "user_message is empty".to_string(),
        ));
    }
    let package = runtime
        .compose_context(&session_id, &payload.user_message, payload.agent_state)
        .await?;
    Ok(Json(package))
}

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn contract<M: Into<String>>(msg: M) -> Self {
        EngineError::ContractViolation(msg.into())
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            EngineError::ContractViolation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            EngineError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            EngineError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            EngineError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::runtime::Runtime;
use crate::server::handlers::{diagnostics, health, sessions};

pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/sessions/:session_id/turns",
            post(sessions::commit_turn),
        )
        .route(
            "/api/sessions/:session_id/context",
            post(sessions::compose_context),
        )
        .route("/api/diagnostics", get(diagnostics::diagnostics))
        .with_state(runtime)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer() -> CorsLayer {
    let origins = local_origins()
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn local_origins() -> Vec<&'static str> {
    vec![
        "http://localhost",
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:5173",
    ]
}

use axum::{
    http::header::{AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION},
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    sensitive_headers::SetSensitiveRequestHeadersLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

/// Credentials are marked sensitive before `TraceLayer` records headers, so
/// they show up as `Sensitive` in the request span.
fn sensitive_headers() -> SetSensitiveRequestHeadersLayer {
    SetSensitiveRequestHeadersLayer::new([AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE])
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/query", post(handlers::query::query_handler))
        .route("/memory", get(handlers::memory::memory_history))
        .route("/memory/clear", delete(handlers::memory::clear_memory))
        .with_state(state)
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(sensitive_headers())
}

//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (token in `?token=`)
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Account
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/me", get(http::http_me))
        // Courses
        .route("/api/v1/courses", get(http::http_list_courses).post(http::http_create_course))
        .route("/api/v1/courses/generate", post(http::http_generate_course))
        .route("/api/v1/courses/:id", get(http::http_get_course))
        .route("/api/v1/courses/:id/analytics", get(http::http_course_analytics))
        // Enrollment + progress
        .route("/api/v1/courses/:id/enroll", post(http::http_enroll))
        .route("/api/v1/courses/:id/lessons", get(http::http_lessons))
        .route("/api/v1/courses/:id/lessons/:order/complete", post(http::http_complete_lesson))
        .route("/api/v1/courses/:id/lessons/:order/project", post(http::http_submit_project))
        // Quiz sessions
        .route("/api/v1/quiz-sessions", post(http::http_start_quiz))
        .route("/api/v1/quiz-sessions/:id", get(http::http_get_session))
        .route("/api/v1/quiz-sessions/:id/select", post(http::http_select))
        .route("/api/v1/quiz-sessions/:id/submit", post(http::http_submit))
        .route("/api/v1/quiz-sessions/:id/advance", post(http::http_advance))
        .route("/api/v1/quiz-sessions/:id/save", post(http::http_save))
        .route("/api/v1/quiz-sessions/:id/retake", post(http::http_retake))
        // State + CORS + HTTP tracing
        .with_state(state)
        // tracing wraps CORS so preflight requests are logged too
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

pub mod health;

use axum::{routing::get, routing::post, Router};

use crate::interview::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/interview/start", post(handlers::handle_start))
        .route("/api/v1/interview/answer", post(handlers::handle_answer))
        .route(
            "/api/v1/interview/:session_id/end",
            post(handlers::handle_end),
        )
        .route(
            "/api/v1/interview/:session_id/skip-to-code",
            post(handlers::handle_skip_to_code),
        )
        .with_state(state)
}

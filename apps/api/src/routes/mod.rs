pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::quiz::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/quiz/sessions", post(handlers::handle_start_session))
        .route(
            "/api/v1/quiz/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route(
            "/api/v1/quiz/sessions/:id/answers",
            post(handlers::handle_submit_answer),
        )
        .route("/api/v1/quiz/results", get(handlers::handle_latest_result))
        .with_state(state)
}

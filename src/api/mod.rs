//! API layer
//!
//! HTTP handlers for:
//! - Dashboard page and JSON summary
//! - Quiz API
//! - Metrics (Prometheus)

mod dashboard;
mod dto;
pub mod metrics;
mod quizzes;

pub use dto::*;

pub use metrics::metrics_router;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// Dashboard HTML page
pub fn pages_router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard::dashboard_page))
}

/// JSON API, mounted under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::dashboard_json))
        .route("/me", get(dashboard::me))
        .route(
            "/quizzes",
            get(quizzes::list_quizzes).post(quizzes::create_quiz),
        )
        .route("/quizzes/:id", get(quizzes::get_quiz))
        .route("/quizzes/:id/attempts", post(quizzes::record_attempt))
}

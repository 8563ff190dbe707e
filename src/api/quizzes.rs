//! Quiz endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{CreateQuizRequest, RecordAttemptRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{QuizAttempt, QuizSummary};
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::service::{DashboardService, QuizDetail, QuizService};

/// GET /api/quizzes
///
/// Quizzes created by the caller.
pub async fn list_quizzes(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<QuizSummary>>, AppError> {
    let quizzes = QuizService::new(state.db.clone())
        .list(&session.user.id)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/quizzes", "200"])
        .inc();
    Ok(Json(quizzes))
}

/// GET /api/quizzes/:id
///
/// Quiz with its questions; unpublished quizzes only for their creator.
pub async fn get_quiz(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizDetail>, AppError> {
    let detail = QuizService::new(state.db.clone())
        .get(&quiz_id, &session.user.id)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/quizzes/:id", "200"])
        .inc();
    Ok(Json(detail))
}

/// POST /api/quizzes
pub async fn create_quiz(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(request): Json<CreateQuizRequest>,
) -> Result<(StatusCode, Json<QuizSummary>), AppError> {
    // Quizzes reference the local user row
    DashboardService::new(state.db.clone())
        .sync_user(&session.user)
        .await?;

    let summary = QuizService::new(state.db.clone())
        .create(&session.user.id, request.into())
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/quizzes", "201"])
        .inc();
    Ok((StatusCode::CREATED, Json(summary)))
}

/// POST /api/quizzes/:id/attempts
pub async fn record_attempt(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(quiz_id): Path<String>,
    Json(request): Json<RecordAttemptRequest>,
) -> Result<(StatusCode, Json<QuizAttempt>), AppError> {
    DashboardService::new(state.db.clone())
        .sync_user(&session.user)
        .await?;

    let attempt = QuizService::new(state.db.clone())
        .record_attempt(&quiz_id, &session.user.id, request.score, request.completed)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/quizzes/:id/attempts", "201"])
        .inc();
    Ok((StatusCode::CREATED, Json(attempt)))
}

//! Quiz service
//!
//! Quiz creation, lookup and attempt recording with input validation.

use std::sync::Arc;

use serde::Serialize;

use crate::data::{Database, NewQuiz, QuizAttempt, QuizSummary};
use crate::error::AppError;

/// Largest score a single attempt may record
///
/// Keeps leaderboard sums far away from 64-bit overflow.
pub const MAX_SCORE: i64 = i32::MAX as i64;

fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Quiz creation input
#[derive(Debug, Clone, Default)]
pub struct QuizDraft {
    pub title: String,
    pub description: Option<String>,
    pub published: bool,
    pub cover_image: Option<String>,
    pub questions: Vec<String>,
}

/// A quiz with its question prompts, in order
#[derive(Debug, Clone, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub summary: QuizSummary,
    pub questions: Vec<String>,
}

/// Quiz service
pub struct QuizService {
    db: Arc<Database>,
}

impl QuizService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn list(&self, creator_id: &str) -> Result<Vec<QuizSummary>, AppError> {
        self.db.user_quizzes(creator_id).await
    }

    /// Quiz `quiz_id` as seen by `viewer_id`
    ///
    /// Unpublished quizzes are only visible to their creator; everyone else
    /// gets `NotFound`.
    pub async fn get(&self, quiz_id: &str, viewer_id: &str) -> Result<QuizDetail, AppError> {
        let quiz = self.db.get_quiz(quiz_id).await?.ok_or(AppError::NotFound)?;
        if !quiz.published && quiz.creator_id != viewer_id {
            return Err(AppError::NotFound);
        }

        let summary = self
            .db
            .get_quiz_summary(quiz_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let questions = self.db.quiz_questions(quiz_id).await?;
        Ok(QuizDetail { summary, questions })
    }

    /// Create a quiz owned by `creator_id`
    ///
    /// # Errors
    /// `Unprocessable` when the trimmed title or any question prompt is empty
    pub async fn create(&self, creator_id: &str, draft: QuizDraft) -> Result<QuizSummary, AppError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(AppError::Unprocessable("title is required".to_string()));
        }

        let questions: Vec<String> = draft
            .questions
            .iter()
            .map(|prompt| prompt.trim().to_string())
            .collect();
        if questions.iter().any(String::is_empty) {
            return Err(AppError::Unprocessable(
                "question prompts cannot be empty".to_string(),
            ));
        }

        let summary = self
            .db
            .create_quiz(&NewQuiz {
                creator_id: creator_id.to_string(),
                title: title.to_string(),
                description: normalize_optional_text(draft.description),
                published: draft.published,
                cover_image: normalize_optional_text(draft.cover_image),
                questions,
            })
            .await?;

        tracing::info!(quiz_id = %summary.id, creator_id, "Quiz created");
        Ok(summary)
    }

    /// Record an attempt by `user_id` on `quiz_id`
    ///
    /// # Errors
    /// - `NotFound` for an unknown quiz
    /// - `Unprocessable` for a score outside `0..=MAX_SCORE`
    pub async fn record_attempt(
        &self,
        quiz_id: &str,
        user_id: &str,
        score: i64,
        completed: bool,
    ) -> Result<QuizAttempt, AppError> {
        if !(0..=MAX_SCORE).contains(&score) {
            return Err(AppError::Unprocessable(format!(
                "score must be between 0 and {MAX_SCORE}"
            )));
        }
        if self.db.get_quiz(quiz_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let attempt = self
            .db
            .record_attempt(quiz_id, user_id, score, completed)
            .await?;
        tracing::info!(quiz_id, user_id, score, completed, "Quiz attempt recorded");
        Ok(attempt)
    }
}

//! Request and response bodies of the JSON API

use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::service::QuizDraft;

/// POST /api/quizzes
#[derive(Debug, Deserialize)]
pub struct CreateQuizRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub published: bool,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl From<CreateQuizRequest> for QuizDraft {
    fn from(request: CreateQuizRequest) -> Self {
        Self {
            title: request.title,
            description: request.description,
            published: request.published,
            cover_image: request.cover_image,
            questions: request.questions,
        }
    }
}

/// POST /api/quizzes/:id/attempts
#[derive(Debug, Deserialize)]
pub struct RecordAttemptRequest {
    pub score: i64,
    #[serde(default)]
    pub completed: bool,
}

/// GET /api/me
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&User> for MeResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name().map(str::to_string),
            avatar_url: user.avatar_url().map(str::to_string),
        }
    }
}

//! Data models
//!
//! Rust structs representing database entities and dashboard read models.
//! Stored entities use ULID for IDs and chrono for timestamps; user IDs
//! come from the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Users
// =============================================================================

/// Local mirror of an identity provider user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    /// Provider user id
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Avatar URL
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Quizzes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quiz {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    pub description: Option<String>,
    pub published: bool,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New quiz with its question prompts, in order
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub creator_id: String,
    pub title: String,
    pub description: Option<String>,
    pub published: bool,
    pub cover_image: Option<String>,
    pub questions: Vec<String>,
}

/// Quiz with question and attempt counts
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub published: bool,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub question_count: i64,
    pub attempt_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizAttempt {
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub score: Option<i64>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Activity / leaderboard
// =============================================================================

/// Kind of activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Completion,
    Attempt,
}

impl ActivityKind {
    pub fn from_completed(completed: bool) -> Self {
        if completed {
            ActivityKind::Completion
        } else {
            ActivityKind::Attempt
        }
    }
}

/// User shown next to activity and leaderboard rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// One attempt on a quiz the viewer created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub kind: ActivityKind,
    pub quiz_id: String,
    pub quiz_title: String,
    pub score: Option<i64>,
    pub user: ParticipantInfo,
    pub created_at: DateTime<Utc>,
}

/// Leaderboard row, ranked by summed score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based rank
    pub position: usize,
    pub user: ParticipantInfo,
    pub attempt_count: i64,
    pub score: i64,
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    /// Values: free, pro, premium
    pub plan: String,
    /// Values: active, canceled, past_due, ...
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

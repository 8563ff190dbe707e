//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::models::*;
use crate::error::AppError;
use crate::metrics::record_db_query;

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    completed: bool,
    quiz_id: String,
    quiz_title: String,
    score: Option<i64>,
    created_at: chrono::DateTime<Utc>,
    user_id: String,
    user_name: Option<String>,
    user_email: Option<String>,
    user_image: Option<String>,
}

impl From<ActivityRow> for ActivityEntry {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            kind: ActivityKind::from_completed(row.completed),
            quiz_id: row.quiz_id,
            quiz_title: row.quiz_title,
            score: row.score,
            user: ParticipantInfo {
                id: row.user_id,
                name: row.user_name,
                email: row.user_email,
                image: row.user_image,
            },
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LeaderboardRow {
    user_id: String,
    name: Option<String>,
    email: Option<String>,
    image: Option<String>,
    attempt_count: i64,
    score: i64,
}

const QUIZ_SUMMARY_SELECT: &str = r#"
    SELECT
        q.id, q.title, q.description, q.published, q.cover_image,
        q.created_at, q.updated_at,
        (SELECT COUNT(*) FROM questions qs WHERE qs.quiz_id = q.id) AS question_count,
        (SELECT COUNT(*) FROM quiz_attempts qa WHERE qa.quiz_id = q.id) AS attempt_count
    FROM quizzes q
"#;

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create or refresh the local copy of a provider user
    ///
    /// Keeps `created_at` from the first insert.
    pub async fn upsert_user(
        &self,
        id: &str,
        email: Option<&str>,
        name: Option<&str>,
        image: Option<&str>,
    ) -> Result<UserProfile, AppError> {
        let now = Utc::now();
        record_db_query("upsert", "users");

        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO users (id, email, name, image, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = COALESCE(excluded.name, users.name),
                image = COALESCE(excluded.image, users.image),
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(image)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserProfile>, AppError> {
        record_db_query("select", "users");
        let user = sqlx::query_as::<_, UserProfile>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // =========================================================================
    // Quizzes
    // =========================================================================

    /// Quizzes created by `creator_id`, most recently updated first
    pub async fn user_quizzes(&self, creator_id: &str) -> Result<Vec<QuizSummary>, AppError> {
        record_db_query("select", "quizzes");
        let quizzes = sqlx::query_as::<_, QuizSummary>(&format!(
            "{QUIZ_SUMMARY_SELECT} WHERE q.creator_id = ? ORDER BY q.updated_at DESC, q.id DESC"
        ))
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(quizzes)
    }

    pub async fn get_quiz(&self, id: &str) -> Result<Option<Quiz>, AppError> {
        record_db_query("select", "quizzes");
        let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(quiz)
    }

    pub async fn get_quiz_summary(&self, id: &str) -> Result<Option<QuizSummary>, AppError> {
        record_db_query("select", "quizzes");
        let quiz = sqlx::query_as::<_, QuizSummary>(&format!("{QUIZ_SUMMARY_SELECT} WHERE q.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(quiz)
    }

    /// Insert a quiz and its questions atomically
    pub async fn create_quiz(&self, quiz: &NewQuiz) -> Result<QuizSummary, AppError> {
        let id = EntityId::new().0;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        record_db_query("insert", "quizzes");
        sqlx::query(
            r#"
            INSERT INTO quizzes (
                id, creator_id, title, description, published, cover_image,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&quiz.creator_id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.published)
        .bind(&quiz.cover_image)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, prompt) in quiz.questions.iter().enumerate() {
            record_db_query("insert", "questions");
            sqlx::query("INSERT INTO questions (id, quiz_id, prompt, position) VALUES (?, ?, ?, ?)")
                .bind(EntityId::new().0)
                .bind(&id)
                .bind(prompt)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_quiz_summary(&id).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("quiz {id} missing right after insert"))
        })
    }

    /// Question prompts of a quiz, in order
    pub async fn quiz_questions(&self, quiz_id: &str) -> Result<Vec<String>, AppError> {
        record_db_query("select", "questions");
        let prompts = sqlx::query_scalar::<_, String>(
            "SELECT prompt FROM questions WHERE quiz_id = ? ORDER BY position",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prompts)
    }

    // =========================================================================
    // Attempts
    // =========================================================================

    pub async fn record_attempt(
        &self,
        quiz_id: &str,
        user_id: &str,
        score: i64,
        completed: bool,
    ) -> Result<QuizAttempt, AppError> {
        record_db_query("insert", "quiz_attempts");
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts (id, quiz_id, user_id, score, completed, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(EntityId::new().0)
        .bind(quiz_id)
        .bind(user_id)
        .bind(score)
        .bind(completed)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    /// The most recent attempts on quizzes created by `creator_id`
    pub async fn quiz_activity(
        &self,
        creator_id: &str,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>, AppError> {
        record_db_query("select", "quiz_attempts");
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT
                qa.id, qa.completed, qa.quiz_id, q.title AS quiz_title, qa.score,
                qa.created_at, u.id AS user_id, u.name AS user_name,
                u.email AS user_email, u.image AS user_image
            FROM quiz_attempts qa
            JOIN quizzes q ON q.id = qa.quiz_id
            JOIN users u ON u.id = qa.user_id
            WHERE q.creator_id = ?
            ORDER BY qa.created_at DESC, qa.id DESC
            LIMIT ?
            "#,
        )
        .bind(creator_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }

    /// Users ranked by the sum of all their attempt scores
    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        record_db_query("select", "quiz_attempts");
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT
                u.id AS user_id, u.name, u.email, u.image,
                COUNT(qa.id) AS attempt_count,
                COALESCE(SUM(qa.score), 0) AS score
            FROM quiz_attempts qa
            JOIN users u ON u.id = qa.user_id
            GROUP BY u.id
            ORDER BY score DESC, u.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| LeaderboardEntry {
                position: index + 1,
                user: ParticipantInfo {
                    id: row.user_id,
                    name: row.name,
                    email: row.email,
                    image: row.image,
                },
                attempt_count: row.attempt_count,
                score: row.score,
            })
            .collect())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    pub async fn latest_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        record_db_query("select", "subscriptions");
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    pub async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        record_db_query("insert", "subscriptions");
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, user_id, plan, status, current_period_end, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.user_id)
        .bind(&subscription.plan)
        .bind(&subscription.status)
        .bind(subscription.current_period_end)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

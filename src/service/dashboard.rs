//! Dashboard service
//!
//! Assembles the signed-in user's dashboard from the database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::User;
use crate::data::{ActivityEntry, Database, LeaderboardEntry, QuizSummary, Subscription, UserProfile};
use crate::error::AppError;

/// Quizzes shown on the dashboard overview
pub const DASHBOARD_QUIZ_LIMIT: usize = 6;
/// Activity entries shown on the dashboard
pub const ACTIVITY_LIMIT: i64 = 10;
/// Leaderboard size
pub const LEADERBOARD_LIMIT: i64 = 5;

/// Features unlocked by a subscription plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanFeatures {
    pub unlimited_quizzes: bool,
    pub custom_branding: bool,
    pub analytics: bool,
    pub export_results: bool,
    pub team_collaboration: bool,
}

impl PlanFeatures {
    /// Features for a plan name; unknown plans get nothing
    pub fn for_plan(plan: &str) -> Self {
        let pro = Self {
            unlimited_quizzes: true,
            custom_branding: true,
            analytics: true,
            export_results: true,
            team_collaboration: false,
        };
        match plan {
            "pro" => pro,
            "premium" => Self {
                team_collaboration: true,
                ..pro
            },
            _ => Self::default(),
        }
    }
}

/// Current plan of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub status: String,
    pub plan: String,
    pub renewal_date: Option<DateTime<Utc>>,
    pub features: PlanFeatures,
}

impl SubscriptionStatus {
    /// Status for a user without any subscription
    pub fn free() -> Self {
        Self {
            status: "inactive".to_string(),
            plan: "free".to_string(),
            renewal_date: None,
            features: PlanFeatures::default(),
        }
    }
}

impl From<Option<Subscription>> for SubscriptionStatus {
    fn from(subscription: Option<Subscription>) -> Self {
        match subscription {
            Some(subscription) => Self {
                features: PlanFeatures::for_plan(&subscription.plan),
                status: subscription.status,
                plan: subscription.plan,
                renewal_date: subscription.current_period_end,
            },
            None => Self::free(),
        }
    }
}

/// Everything the dashboard page shows
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub greeting_name: String,
    pub quiz_count: usize,
    pub quizzes: Vec<QuizSummary>,
    pub activity: Vec<ActivityEntry>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub subscription: SubscriptionStatus,
}

/// Name used in "Welcome back, ..."
pub fn greeting_name(user: &User) -> String {
    user.display_name()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("User")
        .to_string()
}

/// Dashboard service
pub struct DashboardService {
    db: Arc<Database>,
}

impl DashboardService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Mirror the provider user into the local users table
    pub async fn sync_user(&self, user: &User) -> Result<UserProfile, AppError> {
        self.db
            .upsert_user(
                &user.id,
                user.email.as_deref(),
                user.display_name(),
                user.avatar_url(),
            )
            .await
    }

    /// Build the dashboard for `user`, syncing the profile first
    pub async fn summary(&self, user: &User) -> Result<DashboardSummary, AppError> {
        self.sync_user(user).await?;

        let (quizzes, activity, leaderboard, subscription) = tokio::try_join!(
            self.db.user_quizzes(&user.id),
            self.db.quiz_activity(&user.id, ACTIVITY_LIMIT),
            self.db.leaderboard(LEADERBOARD_LIMIT),
            self.db.latest_subscription(&user.id),
        )?;

        tracing::debug!(
            user_id = %user.id,
            quizzes = quizzes.len(),
            activity = activity.len(),
            "Dashboard summary loaded"
        );

        let quiz_count = quizzes.len();
        Ok(DashboardSummary {
            greeting_name: greeting_name(user),
            quiz_count,
            quizzes: quizzes.into_iter().take(DASHBOARD_QUIZ_LIMIT).collect(),
            activity,
            leaderboard,
            subscription: subscription.into(),
        })
    }
}

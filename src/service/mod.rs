//! Service layer
//!
//! Contains business logic separated from HTTP handlers.

mod dashboard;
mod quiz;

pub use dashboard::{
    DashboardService, DashboardSummary, PlanFeatures, SubscriptionStatus, greeting_name,
};
pub use quiz::{MAX_SCORE, QuizDetail, QuizDraft, QuizService};

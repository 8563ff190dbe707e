//! Dashboard endpoints
//!
//! The HTML page and its JSON twin share [`DashboardService::summary`].

use axum::{
    extract::State,
    response::{Html, IntoResponse, Json, Redirect, Response},
};

use super::dto::MeResponse;
use crate::AppState;
use crate::auth::fragment::SIGN_IN_PATH;
use crate::auth::{CurrentUser, MaybeUser, SessionClient};
use crate::error::AppError;
use crate::metrics::HTTP_REQUESTS_TOTAL;
use crate::service::{DashboardService, DashboardSummary};

/// GET /api/dashboard
pub async fn dashboard_json(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<DashboardSummary>, AppError> {
    let summary = DashboardService::new(state.db.clone())
        .summary(&session.user)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/dashboard", "200"])
        .inc();
    Ok(Json(summary))
}

/// GET /api/me
///
/// Validates the access token with the provider rather than trusting the
/// cookie contents.
pub async fn me(mut client: SessionClient) -> Result<Response, AppError> {
    let Some(user) = client.get_user().await? else {
        return Err(AppError::Unauthorized);
    };

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/me", "200"])
        .inc();
    Ok((client.into_jar(), Json(MeResponse::from(&user))).into_response())
}

/// GET /dashboard
pub async fn dashboard_page(
    State(state): State<AppState>,
    MaybeUser(session): MaybeUser,
) -> Result<Response, AppError> {
    let Some(session) = session else {
        return Ok(Redirect::to(SIGN_IN_PATH).into_response());
    };

    let summary = DashboardService::new(state.db.clone())
        .summary(&session.user)
        .await?;
    Ok(Html(render_dashboard(&summary)).into_response())
}

fn render_dashboard(summary: &DashboardSummary) -> String {
    use html_escape::encode_text as text;

    let quizzes = if summary.quizzes.is_empty() {
        "<p>You haven't created any quizzes yet.</p>".to_string()
    } else {
        let items: Vec<String> = summary
            .quizzes
            .iter()
            .map(|quiz| {
                format!(
                    "<li>{} ({} questions, {} attempts{})</li>",
                    text(&quiz.title),
                    quiz.question_count,
                    quiz.attempt_count,
                    if quiz.published { ", published" } else { "" }
                )
            })
            .collect();
        format!("<ul>{}</ul>", items.join(""))
    };

    let activity = if summary.activity.is_empty() {
        "<p>No recent activity.</p>".to_string()
    } else {
        let items: Vec<String> = summary
            .activity
            .iter()
            .map(|entry| {
                let who = entry
                    .user
                    .name
                    .as_deref()
                    .or(entry.user.email.as_deref())
                    .unwrap_or("Someone");
                let verb = match entry.kind {
                    crate::data::ActivityKind::Completion => "completed",
                    crate::data::ActivityKind::Attempt => "attempted",
                };
                let score = entry
                    .score
                    .map(|score| format!(" with score {score}"))
                    .unwrap_or_default();
                format!(
                    "<li>{} {verb} {}{score}</li>",
                    text(who),
                    text(&entry.quiz_title)
                )
            })
            .collect();
        format!("<ul>{}</ul>", items.join(""))
    };

    let leaderboard = if summary.leaderboard.is_empty() {
        "<p>No scores yet.</p>".to_string()
    } else {
        let items: Vec<String> = summary
            .leaderboard
            .iter()
            .map(|entry| {
                let who = entry
                    .user
                    .name
                    .as_deref()
                    .or(entry.user.email.as_deref())
                    .unwrap_or("Anonymous");
                format!("<li>#{} {} - {}</li>", entry.position, text(who), entry.score)
            })
            .collect();
        format!("<ol>{}</ol>", items.join(""))
    };

    let subscription = &summary.subscription;
    let renewal = subscription
        .renewal_date
        .map(|date| format!(" (renews {})", date.format("%Y-%m-%d")))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Dashboard - QuizGate</title></head>
<body>
    <h1>Welcome back, {name}!</h1>
    <form method="post" action="/sign-out"><button type="submit">Sign out</button></form>
    <section>
        <h2>Your quizzes ({count})</h2>
        {quizzes}
    </section>
    <section>
        <h2>Recent activity</h2>
        {activity}
    </section>
    <section>
        <h2>Leaderboard</h2>
        {leaderboard}
    </section>
    <section>
        <h2>Subscription</h2>
        <p>{plan} plan, {status}{renewal}</p>
    </section>
</body>
</html>
"#,
        name = text(&summary.greeting_name),
        count = summary.quiz_count,
        plan = text(&subscription.plan),
        status = text(&subscription.status),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SubscriptionStatus;

    #[test]
    fn empty_dashboard_renders_placeholders() {
        let summary = DashboardSummary {
            greeting_name: "<b>Ada</b>".to_string(),
            quiz_count: 0,
            quizzes: vec![],
            activity: vec![],
            leaderboard: vec![],
            subscription: SubscriptionStatus::free(),
        };
        let page = render_dashboard(&summary);
        assert!(page.contains("Welcome back, &lt;b&gt;Ada&lt;/b&gt;!"));
        assert!(page.contains("You haven't created any quizzes yet."));
        assert!(page.contains("free plan, inactive"));
    }
}

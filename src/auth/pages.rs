//! Sign-in page and credential endpoints

use axum::{
    Form,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use super::client::SessionClient;
use super::fragment::{DASHBOARD_PATH, SIGN_IN_PATH};
use super::middleware::MaybeUser;
use crate::AppState;
use crate::metrics::record_auth_flow;

/// OAuth providers offered on the sign-in page
pub const OAUTH_PROVIDERS: &[&str] = &["google", "github"];

/// Which form the page shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FormMode {
    #[default]
    SignIn,
    SignUp,
}

/// Notice shown above the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// GET /auth query parameters
#[derive(Debug, Deserialize, Default)]
pub struct AuthPageQuery {
    #[serde(default)]
    mode: FormMode,
    error: Option<String>,
    message: Option<String>,
}

/// Email/password form body
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    email: String,
    password: String,
}

/// Translate provider messages into something a user can act on
///
/// Returns the text and the form mode to show next.
pub fn describe_auth_error(message: &str, mode: FormMode) -> (String, FormMode) {
    let lowered = message.to_lowercase();

    if lowered.contains("invalid login credentials") {
        ("Invalid email or password. Please try again.".to_string(), mode)
    } else if lowered.contains("email not confirmed") {
        (
            "Please check your email to confirm your account before signing in.".to_string(),
            mode,
        )
    } else if lowered.contains("already registered") {
        (
            "This email is already registered. Please sign in instead.".to_string(),
            FormMode::SignIn,
        )
    } else {
        (message.to_string(), mode)
    }
}

fn describe_error_code(code: &str) -> &'static str {
    match code {
        "no_code" => "The sign-in link was incomplete. Please try again.",
        "exchange_error" => "We could not complete your sign-in.",
        "callback_exception" => "Something went wrong while signing you in.",
        "oauth_callback_failed" => "Third-party sign-in failed.",
        _ => "Authentication failed.",
    }
}

/// GET /auth
///
/// Visitors who already have a session go straight to the dashboard;
/// everyone else gets the form.
pub async fn auth_page(
    MaybeUser(session): MaybeUser,
    Query(query): Query<AuthPageQuery>,
) -> Response {
    if let Some(session) = session {
        tracing::debug!(user_id = %session.user.id, "Signed-in user opened auth page");
        return Redirect::to(DASHBOARD_PATH).into_response();
    }

    let notice = query.error.as_deref().map(|code| {
        let text = match query.message.as_deref().filter(|m| !m.is_empty()) {
            Some(message) => format!("{} {}", describe_error_code(code), message),
            None => describe_error_code(code).to_string(),
        };
        Notice::Error(text)
    });

    Html(render_auth_page(query.mode, notice.as_ref(), "")).into_response()
}

/// POST /auth/sign-in
pub async fn sign_in(mut client: SessionClient, Form(form): Form<CredentialsForm>) -> Response {
    let email = form.email.trim();

    match client.sign_in_with_password(email, &form.password).await {
        Ok(session) => {
            tracing::info!(user_id = %session.user.id, "Signed in with password");
            record_auth_flow("password_sign_in", "success");
            (client.into_jar(), Redirect::to(DASHBOARD_PATH)).into_response()
        }
        Err(error) => {
            tracing::warn!(%error, "Password sign-in failed");
            record_auth_flow("password_sign_in", "failure");
            let (text, mode) = describe_auth_error(&error.to_string(), FormMode::SignIn);
            Html(render_auth_page(mode, Some(&Notice::Error(text)), email)).into_response()
        }
    }
}

/// POST /auth/sign-up
///
/// Without an immediate session the user is told to confirm their email
/// and stays on the page.
pub async fn sign_up(
    State(state): State<AppState>,
    mut client: SessionClient,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let email = form.email.trim();
    let min_length = state.config.auth.min_password_length;

    if form.password.chars().count() < min_length {
        let notice = Notice::Error(format!(
            "Password must be at least {min_length} characters long."
        ));
        return Html(render_auth_page(FormMode::SignUp, Some(&notice), email)).into_response();
    }

    let redirect_to = format!("{}/auth/callback", state.config.server.base_url());
    match client.sign_up(email, &form.password, &redirect_to).await {
        Ok(outcome) if outcome.session.is_some() => {
            tracing::info!("Sign-up confirmed immediately");
            record_auth_flow("sign_up", "session");
            (client.into_jar(), Redirect::to(DASHBOARD_PATH)).into_response()
        }
        Ok(outcome) => {
            tracing::info!(
                user_id = ?outcome.user.as_ref().map(|user| user.id.as_str()),
                "Sign-up awaiting email confirmation"
            );
            record_auth_flow("sign_up", "confirmation_required");
            let notice = Notice::Success(
                "Check your email for a confirmation link to complete your registration."
                    .to_string(),
            );
            let page = render_auth_page(FormMode::SignUp, Some(&notice), email);
            (client.into_jar(), Html(page)).into_response()
        }
        Err(error) => {
            tracing::warn!(%error, "Sign-up failed");
            record_auth_flow("sign_up", "failure");
            let (text, mode) = describe_auth_error(&error.to_string(), FormMode::SignUp);
            Html(render_auth_page(mode, Some(&Notice::Error(text)), email)).into_response()
        }
    }
}

/// GET /auth/oauth/:provider
///
/// Stores a PKCE verifier and sends the browser to the provider.
pub async fn oauth_start(
    State(state): State<AppState>,
    mut client: SessionClient,
    Path(provider): Path<String>,
) -> Response {
    if !OAUTH_PROVIDERS.contains(&provider.as_str()) {
        let notice = Notice::Error(format!("Unsupported sign-in provider: {provider}"));
        return Html(render_auth_page(FormMode::SignIn, Some(&notice), "")).into_response();
    }

    let redirect_to = format!("{}/auth/callback", state.config.server.base_url());
    let url = client.sign_in_with_oauth(&provider, &redirect_to);
    tracing::info!(provider = %provider, "Starting OAuth sign-in");
    (client.into_jar(), Redirect::to(&url)).into_response()
}

/// POST /sign-out
///
/// Provider failures are logged; the local session is dropped regardless.
pub async fn sign_out(mut client: SessionClient) -> Response {
    if let Err(error) = client.sign_out().await {
        tracing::warn!(%error, "Provider sign-out failed");
    }
    record_auth_flow("sign_out", "success");
    (client.into_jar(), Redirect::to(SIGN_IN_PATH)).into_response()
}

/// Render the sign-in / sign-up page
pub fn render_auth_page(mode: FormMode, notice: Option<&Notice>, email: &str) -> String {
    use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

    let (heading, action, submit, toggle_href, toggle_text) = match mode {
        FormMode::SignIn => (
            "Sign in to your account",
            "/auth/sign-in",
            "Sign in",
            "/auth?mode=sign-up",
            "Don't have an account? Sign up",
        ),
        FormMode::SignUp => (
            "Create a new account",
            "/auth/sign-up",
            "Sign up",
            "/auth?mode=sign-in",
            "Already have an account? Sign in",
        ),
    };

    let notice_html = match notice {
        Some(Notice::Success(message)) => {
            format!(r#"<p class="notice success" role="status">{}</p>"#, text(message))
        }
        Some(Notice::Error(message)) => {
            format!(r#"<p class="notice error" role="alert">{}</p>"#, text(message))
        }
        None => String::new(),
    };

    let oauth_links: String = OAUTH_PROVIDERS
        .iter()
        .map(|provider| {
            format!(
                r#"<a href="/auth/oauth/{provider}">Continue with {}</a>"#,
                capitalize(provider)
            )
        })
        .collect::<Vec<_>>()
        .join("\n            ");

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{heading} - QuizGate</title></head>
<body>
    <h1>QuizGate</h1>
    <p>Create, share, and take quizzes with ease</p>
    <h2>{heading}</h2>
    {notice_html}
    <form method="post" action="{action}">
        <label for="email">Email</label>
        <input id="email" name="email" type="email" value="{email}" required>
        <label for="password">Password</label>
        <input id="password" name="password" type="password" required>
        <button type="submit">{submit}</button>
    </form>
    <p>OR</p>
    <nav>
            {oauth_links}
    </nav>
    <a href="{toggle_href}">{toggle_text}</a>
</body>
</html>
"#,
        email = attr(email),
    )
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! Provider callback endpoints
//!
//! - `GET /auth/callback`: authorization code exchange
//! - `GET|POST /auth/handle-hash-callback`: implicit-flow tokens
//! - `GET|POST /auth/oauth-callback`: session check with fragment fallback

use axum::{
    Json,
    extract::Query,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use super::client::SessionClient;
use super::fragment::{
    CallbackOutcome, DASHBOARD_PATH, SIGN_IN_PATH, handle_hash_callback, handle_oauth_callback,
};
use super::provider::ProviderError;
use crate::metrics::record_auth_flow;

/// Query parameters of the code-exchange callback
#[derive(Debug, Deserialize)]
pub struct CodeCallbackQuery {
    code: Option<String>,
}

/// Sign-in page URL carrying an error code and optional message
pub fn sign_in_error_url(error: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!(
            "{SIGN_IN_PATH}?error={error}&message={}",
            urlencoding::encode(message)
        ),
        None => format!("{SIGN_IN_PATH}?error={error}"),
    }
}

/// GET /auth/callback
///
/// Exchanges `code` for a session exactly once.
///
/// # Redirects
/// - no code: `/auth?error=no_code`
/// - provider rejection: `/auth?error=exchange_error&message=...`
/// - anything else going wrong: `/auth?error=callback_exception&message=...`
/// - success: `/dashboard`
pub async fn code_callback(
    mut client: SessionClient,
    Query(query): Query<CodeCallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        tracing::warn!("Auth callback triggered without a code");
        record_auth_flow("code_exchange", "no_code");
        return Redirect::to(&sign_in_error_url("no_code", None)).into_response();
    };

    let result = client.exchange_code_for_session(&code).await;
    let jar = client.into_jar();

    match result {
        Ok(session) => {
            tracing::info!(user_id = %session.user.id, "Session established from code exchange");
            record_auth_flow("code_exchange", "success");
            (jar, Redirect::to(DASHBOARD_PATH)).into_response()
        }
        Err(error) if error.is_rejection() => {
            tracing::warn!(%error, "Error exchanging code for session");
            record_auth_flow("code_exchange", "exchange_error");
            let target = sign_in_error_url("exchange_error", Some(&error.to_string()));
            (jar, Redirect::to(&target)).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "Exception in callback handler");
            record_auth_flow("code_exchange", "callback_exception");
            let target = sign_in_error_url("callback_exception", Some(&exception_message(&error)));
            (jar, Redirect::to(&target)).into_response()
        }
    }
}

fn exception_message(error: &ProviderError) -> String {
    let message = error.to_string();
    if message.is_empty() {
        "Unknown error".to_string()
    } else {
        message
    }
}

/// Body posted by the callback pages
#[derive(Debug, Deserialize)]
pub struct FragmentPayload {
    #[serde(default)]
    fragment: String,
}

/// GET /auth/handle-hash-callback
pub async fn hash_callback_page() -> Html<String> {
    Html(callback_page(
        "Authentication in progress",
        "/auth/handle-hash-callback",
    ))
}

/// POST /auth/handle-hash-callback
///
/// Runs the hash flow with the fragment the page forwarded.
pub async fn hash_callback(
    mut client: SessionClient,
    Json(payload): Json<FragmentPayload>,
) -> impl IntoResponse {
    let outcome = handle_hash_callback(&mut client, &payload.fragment).await;
    (client.into_jar(), Json(outcome))
}

/// GET /auth/oauth-callback
pub async fn oauth_callback_page() -> Html<String> {
    Html(callback_page(
        "Authentication in Progress",
        "/auth/oauth-callback",
    ))
}

/// POST /auth/oauth-callback
pub async fn oauth_callback(
    mut client: SessionClient,
    Json(payload): Json<FragmentPayload>,
) -> impl IntoResponse {
    let outcome: CallbackOutcome = handle_oauth_callback(&mut client, &payload.fragment).await;
    (client.into_jar(), Json(outcome))
}

/// Status page that forwards `location.hash` to `endpoint`
///
/// The pending redirect timer is cleared when the page is torn down.
fn callback_page(title: &str, endpoint: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title} - QuizGate</title></head>
<body>
    <h1>{title}</h1>
    <p id="status">Processing authentication...</p>
    <script>
    (function () {{
        var status = document.getElementById("status");
        var timer = null;
        window.addEventListener("pagehide", function () {{
            if (timer !== null) {{ clearTimeout(timer); timer = null; }}
        }});
        fetch("{endpoint}", {{
            method: "POST",
            credentials: "same-origin",
            headers: {{ "Content-Type": "application/json" }},
            body: JSON.stringify({{ fragment: window.location.hash }})
        }})
        .then(function (response) {{ return response.json(); }})
        .then(function (outcome) {{
            status.textContent = outcome.message;
            timer = setTimeout(function () {{
                timer = null;
                window.location.assign(outcome.redirect_to);
            }}, outcome.delay_ms);
        }})
        .catch(function (error) {{
            status.textContent = "Authentication error: " + error;
            timer = setTimeout(function () {{
                timer = null;
                window.location.assign("{sign_in}");
            }}, 3000);
        }});
    }})();
    </script>
</body>
</html>
"#,
        title = html_escape::encode_text(title),
        endpoint = endpoint,
        sign_in = SIGN_IN_PATH,
    )
}

//! Fragment-delivered token flows
//!
//! Implicit-flow tokens arrive in the URL fragment, which browsers never
//! send to a server. The callback pages post `location.hash` back to us;
//! the functions here decide what the page should say and where it should
//! go next.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::client::SessionAccess;
use super::provider::{ProviderError, TokenPair};
use crate::metrics::record_auth_flow;

pub const DASHBOARD_PATH: &str = "/dashboard";
pub const SIGN_IN_PATH: &str = "/auth";

const SUCCESS_DELAY_MS: u64 = 1000;
const NOTICE_DELAY_MS: u64 = 2000;
const FAILURE_DELAY_MS: u64 = 3000;

/// What a callback page shows and where it navigates afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    pub message: String,
    pub redirect_to: String,
    pub delay_ms: u64,
}

impl CallbackOutcome {
    fn new(message: impl Into<String>, redirect_to: impl Into<String>, delay_ms: u64) -> Self {
        Self {
            message: message.into(),
            redirect_to: redirect_to.into(),
            delay_ms,
        }
    }
}

/// Parameters carried by an implicit-flow fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentParams {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    /// `signup`, `recovery`, `invite`, ...
    pub kind: Option<String>,
}

impl FragmentParams {
    /// Parse a fragment (with or without the leading `#`) as a query string
    pub fn parse(fragment: &str) -> Self {
        let raw = fragment.strip_prefix('#').unwrap_or(fragment);
        let mut params = Self::default();

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "access_token" => params.access_token = Some(value),
                "refresh_token" => params.refresh_token = Some(value),
                "expires_in" => params.expires_in = value.parse().ok(),
                "expires_at" => params.expires_at = value.parse().ok(),
                "token_type" => params.token_type = Some(value),
                "type" => params.kind = Some(value),
                _ => {}
            }
        }

        params
    }

    /// Both tokens, if present and non-empty
    pub fn token_pair(&self) -> Option<TokenPair> {
        let access_token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let refresh_token = self.refresh_token.as_deref().filter(|t| !t.is_empty())?;
        Some(TokenPair {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        })
    }
}

/// Failures of the fragment flows
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Incomplete authentication data")]
    IncompleteTokens,

    #[error("No authentication data found")]
    NoAuthData,

    #[error("Failed to establish session")]
    SessionNotEstablished,

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

fn has_fragment(fragment: &str) -> bool {
    !fragment.trim_start_matches('#').is_empty()
}

/// Restore a session from the tokens in `fragment`
///
/// No provider call is made unless both tokens are present.
async fn restore_from_fragment<S: SessionAccess>(
    session: &mut S,
    fragment: &str,
) -> Result<(), CallbackError> {
    let params = FragmentParams::parse(fragment);
    tracing::debug!(
        has_access_token = params.access_token.is_some(),
        has_refresh_token = params.refresh_token.is_some(),
        expires_in = ?params.expires_in,
        expires_at = ?params.expires_at,
        token_type = ?params.token_type,
        kind = ?params.kind,
        "Extracted fragment auth data"
    );

    let tokens = params.token_pair().ok_or(CallbackError::IncompleteTokens)?;
    session.set_session(tokens).await?;
    Ok(())
}

/// Hash-fragment callback
///
/// Restores the session from implicit-flow tokens.
pub async fn handle_hash_callback<S: SessionAccess>(
    session: &mut S,
    fragment: &str,
) -> CallbackOutcome {
    if !has_fragment(fragment) {
        tracing::info!("Hash callback without fragment");
        record_auth_flow("hash_callback", "no_data");
        return CallbackOutcome::new("No authentication data found.", SIGN_IN_PATH, NOTICE_DELAY_MS);
    }

    if !fragment.contains("access_token") {
        tracing::info!("Hash callback fragment carries no access token");
        record_auth_flow("hash_callback", "invalid_data");
        return CallbackOutcome::new("Invalid authentication data", SIGN_IN_PATH, NOTICE_DELAY_MS);
    }

    match restore_from_fragment(session, fragment).await {
        Ok(()) => {
            tracing::info!("Session restored from fragment");
            record_auth_flow("hash_callback", "success");
            CallbackOutcome::new(
                "Authentication successful! Redirecting...",
                DASHBOARD_PATH,
                SUCCESS_DELAY_MS,
            )
        }
        Err(error) => {
            tracing::warn!(%error, "Hash callback failed");
            record_auth_flow("hash_callback", "failure");
            CallbackOutcome::new(
                format!("Authentication error: {error}"),
                SIGN_IN_PATH,
                FAILURE_DELAY_MS,
            )
        }
    }
}

/// Generic OAuth callback
///
/// Accepts an already established session; otherwise consumes the
/// fragment and checks again.
pub async fn handle_oauth_callback<S: SessionAccess>(
    session: &mut S,
    fragment: &str,
) -> CallbackOutcome {
    match resolve_oauth_session(session, fragment).await {
        Ok(message) => {
            record_auth_flow("oauth_callback", "success");
            CallbackOutcome::new(message, DASHBOARD_PATH, SUCCESS_DELAY_MS)
        }
        Err(error) => {
            tracing::warn!(%error, "OAuth callback failed");
            record_auth_flow("oauth_callback", "failure");
            let message = error.to_string();
            CallbackOutcome::new(
                format!("Authentication error: {message}"),
                format!(
                    "{SIGN_IN_PATH}?error=oauth_callback_failed&message={}",
                    urlencoding::encode(&message)
                ),
                FAILURE_DELAY_MS,
            )
        }
    }
}

async fn resolve_oauth_session<S: SessionAccess>(
    session: &mut S,
    fragment: &str,
) -> Result<&'static str, CallbackError> {
    if session.get_session().await?.is_some() {
        return Ok("Authentication successful! Redirecting to dashboard...");
    }

    if !has_fragment(fragment) {
        return Err(CallbackError::NoAuthData);
    }

    restore_from_fragment(session, fragment).await?;
    match session.get_session().await? {
        Some(_) => Ok("Session established! Redirecting..."),
        None => Err(CallbackError::SessionNotEstablished),
    }
}

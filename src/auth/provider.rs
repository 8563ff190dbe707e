//! Identity provider seam
//!
//! The provider owns credentials and token issuance. The application only
//! calls it through [`AuthProvider`], which keeps the GoTrue HTTP client
//! replaceable in tests.

use axum::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session::Session;

/// Authenticated identity as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Display metadata attached to a provider identity
///
/// OAuth providers fill in different keys, so both `full_name` and `name`
/// are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    /// Human readable name, if the provider supplied one
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata
            .full_name
            .as_deref()
            .or(self.user_metadata.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.user_metadata.avatar_url.as_deref()
    }
}

/// Access/refresh token pair used to restore a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Sign-up parameters
#[derive(Debug, Clone)]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    /// Where the confirmation email should send the user back to
    pub email_redirect_to: &'a str,
    /// PKCE S256 challenge for the confirmation-link code exchange
    pub code_challenge: &'a str,
}

/// Result of a sign-up call
///
/// When email confirmation is required the provider returns the user but
/// no session.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// Identity provider failure
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered and refused the request
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A PKCE flow was completed without the verifier cookie
    #[error("PKCE code verifier not found in storage")]
    MissingCodeVerifier,

    /// Access token could not be used and there is nothing to refresh with
    #[error("Auth session missing")]
    SessionMissing,

    /// The provider could not be reached
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with something we could not understand
    #[error("unexpected identity provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the provider (or the flow state) rejected the request, as
    /// opposed to an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ProviderError::Api { .. }
                | ProviderError::MissingCodeVerifier
                | ProviderError::SessionMissing
        )
    }
}

/// Remote operations offered by the identity provider
///
/// Implementations are stateless: cookie handling lives in the
/// request-scoped [`SessionClient`](super::SessionClient).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange an authorization code (PKCE) for a session
    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<Session, ProviderError>;

    /// Obtain a fresh session from a refresh token
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError>;

    /// Resolve the user an access token belongs to
    async fn get_user(&self, access_token: &str) -> Result<User, ProviderError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    async fn sign_up(&self, request: &SignUpRequest<'_>) -> Result<SignUpOutcome, ProviderError>;

    /// Revoke the session belonging to `access_token`
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    /// URL that starts an OAuth sign-in with a third-party `provider`
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String;
}

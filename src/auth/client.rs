//! Request-scoped session client
//!
//! One `SessionClient` is built per request over that request's cookie
//! jar. It reads the provider session cookie, refreshes it when it is
//! about to expire, and records every cookie change so the handler can
//! return the jar with its response. Clients are never shared between
//! requests.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;

use super::provider::{AuthProvider, ProviderError, SignUpOutcome, SignUpRequest, TokenPair, User};
use super::session::{
    DEFAULT_SESSION_LIFETIME_SECS, Session, code_challenge, decode_session_cookie,
    encode_session_cookie, generate_code_verifier, jwt_expiry,
};
use crate::AppState;

/// Cookie naming and attributes
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Session cookie name
    pub name: String,
    /// Set the `Secure` attribute
    pub secure: bool,
    /// Session cookie signing key
    pub secret: String,
}

impl CookieSettings {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            name: config.auth.cookie_name.clone(),
            secure: config.should_use_secure_cookies(),
            secret: config.auth.session_secret.clone(),
        }
    }

    pub fn verifier_name(&self) -> String {
        format!("{}-code-verifier", self.name)
    }

    /// Session cookies outlive the browser session; the provider decides
    /// when the tokens inside stop working. Verifier cookies do not.
    fn build(&self, name: String, value: String, persistent: bool) -> Cookie<'static> {
        let builder = Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure);

        if persistent {
            builder.permanent().build()
        } else {
            builder.build()
        }
    }

    fn removal(&self, name: String) -> Cookie<'static> {
        Cookie::build((name, "")).path("/").build()
    }
}

/// Minimal session operations the callback flows depend on
#[async_trait]
pub trait SessionAccess: Send {
    /// Current session, refreshing it if needed
    async fn get_session(&mut self) -> Result<Option<Session>, ProviderError>;

    /// Restore a session from an access/refresh token pair
    async fn set_session(&mut self, tokens: TokenPair) -> Result<Session, ProviderError>;
}

/// Provider client bound to one request's cookies
pub struct SessionClient {
    provider: Arc<dyn AuthProvider>,
    jar: CookieJar,
    cookies: CookieSettings,
    /// Session already resolved for this request (by the route gate)
    resolved: Option<Option<Session>>,
}

impl SessionClient {
    pub fn new(provider: Arc<dyn AuthProvider>, jar: CookieJar, cookies: CookieSettings) -> Self {
        Self {
            provider,
            jar,
            cookies,
            resolved: None,
        }
    }

    /// Build a client for one request from application state
    pub fn for_request(state: &AppState, jar: CookieJar) -> Self {
        Self::new(
            Arc::clone(&state.provider),
            jar,
            CookieSettings::from_config(&state.config),
        )
    }

    /// Seed the client with a session resolved earlier in the same request
    pub fn with_resolved(mut self, session: Option<Session>) -> Self {
        self.resolved = Some(session);
        self
    }

    /// Hand back the cookie jar, including every change made so far
    pub fn into_jar(self) -> CookieJar {
        self.jar
    }

    fn store_session(&mut self, session: &Session) -> Result<(), ProviderError> {
        let value = encode_session_cookie(session, &self.cookies.secret)
            .map_err(|e| ProviderError::InvalidResponse(format!("session encoding: {e}")))?;
        let cookie = self
            .cookies
            .build(self.cookies.name.clone(), value, true);
        self.jar = self.jar.clone().add(cookie);
        self.resolved = Some(Some(session.clone()));
        Ok(())
    }

    fn clear_session(&mut self) {
        let removal = self.cookies.removal(self.cookies.name.clone());
        self.jar = self.jar.clone().remove(removal);
        self.resolved = Some(None);
    }

    fn take_code_verifier(&mut self) -> Option<String> {
        let verifier = self
            .jar
            .get(&self.cookies.verifier_name())
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())?;
        self.discard_code_verifier();
        Some(verifier)
    }

    fn discard_code_verifier(&mut self) {
        let removal = self.cookies.removal(self.cookies.verifier_name());
        self.jar = self.jar.clone().remove(removal);
    }

    /// Create and store a fresh PKCE verifier, returning its challenge
    fn start_pkce(&mut self) -> String {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);
        let cookie = self.cookies.build(
            self.cookies.verifier_name(),
            verifier,
            false,
        );
        self.jar = self.jar.clone().add(cookie);
        challenge
    }

    /// Current session
    ///
    /// Reads the session cookie; refreshes it through the provider when it
    /// is about to expire. A refresh rejected by the provider removes the
    /// cookie and is reported as an error.
    pub async fn get_session(&mut self) -> Result<Option<Session>, ProviderError> {
        if let Some(resolved) = &self.resolved {
            return Ok(resolved.clone());
        }

        let Some(raw) = self
            .jar
            .get(&self.cookies.name)
            .map(|cookie| cookie.value().to_string())
        else {
            self.resolved = Some(None);
            return Ok(None);
        };

        let Some(session) = decode_session_cookie(&raw, &self.cookies.secret) else {
            tracing::debug!(cookie = %self.cookies.name, "Discarding undecodable or unsigned session cookie");
            self.clear_session();
            return Ok(None);
        };

        if !session.expires_soon() {
            self.resolved = Some(Some(session.clone()));
            return Ok(Some(session));
        }

        tracing::debug!(user_id = %session.user.id, "Refreshing expiring session");
        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => {
                self.store_session(&refreshed)?;
                Ok(Some(refreshed))
            }
            Err(error) => {
                if error.is_rejection() {
                    self.clear_session();
                }
                Err(error)
            }
        }
    }

    /// User of the current session, validated against the provider
    pub async fn get_user(&mut self) -> Result<Option<User>, ProviderError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        self.provider.get_user(&session.access_token).await.map(Some)
    }

    /// Exchange an authorization code using the stored PKCE verifier
    pub async fn exchange_code_for_session(&mut self, code: &str) -> Result<Session, ProviderError> {
        let verifier = self
            .take_code_verifier()
            .ok_or(ProviderError::MissingCodeVerifier)?;
        let session = self.provider.exchange_code(code, &verifier).await?;
        self.store_session(&session)?;
        Ok(session)
    }

    /// Restore a session from tokens delivered outside the code flow
    ///
    /// Expired access tokens are refreshed; live ones are validated by
    /// fetching their user.
    pub async fn set_session(&mut self, tokens: TokenPair) -> Result<Session, ProviderError> {
        let now = Utc::now().timestamp();
        let expires_at = jwt_expiry(&tokens.access_token);

        let session = match expires_at {
            Some(exp) if exp <= now => {
                if tokens.refresh_token.is_empty() {
                    return Err(ProviderError::SessionMissing);
                }
                self.provider.refresh_session(&tokens.refresh_token).await?
            }
            _ => {
                let user = self.provider.get_user(&tokens.access_token).await?;
                Session {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    token_type: "bearer".to_string(),
                    expires_at: expires_at.unwrap_or(now + DEFAULT_SESSION_LIFETIME_SECS),
                    user,
                }
            }
        };

        self.store_session(&session)?;
        Ok(session)
    }

    pub async fn sign_in_with_password(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        self.store_session(&session)?;
        Ok(session)
    }

    /// Register a new user
    ///
    /// Stores the session when the provider confirms immediately; the PKCE
    /// verifier is then no longer needed.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        email_redirect_to: &str,
    ) -> Result<SignUpOutcome, ProviderError> {
        let challenge = self.start_pkce();
        let outcome = self
            .provider
            .sign_up(&SignUpRequest {
                email,
                password,
                email_redirect_to,
                code_challenge: &challenge,
            })
            .await?;

        if let Some(session) = &outcome.session {
            self.store_session(session)?;
            self.discard_code_verifier();
        }
        Ok(outcome)
    }

    /// Start an OAuth sign-in; returns the URL to send the browser to
    pub fn sign_in_with_oauth(&mut self, provider: &str, redirect_to: &str) -> String {
        let challenge = self.start_pkce();
        self.provider.authorize_url(provider, redirect_to, &challenge)
    }

    /// Revoke the session at the provider and drop the cookie
    ///
    /// The cookie is removed even when the provider call fails.
    pub async fn sign_out(&mut self) -> Result<(), ProviderError> {
        let session = self.get_session().await.ok().flatten();
        self.clear_session();

        match session {
            Some(session) => self.provider.sign_out(&session.access_token).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionAccess for SessionClient {
    async fn get_session(&mut self) -> Result<Option<Session>, ProviderError> {
        SessionClient::get_session(self).await
    }

    async fn set_session(&mut self, tokens: TokenPair) -> Result<Session, ProviderError> {
        SessionClient::set_session(self, tokens).await
    }
}

/// Session resolved by the route gate for the current request
#[derive(Debug, Clone)]
pub struct ResolvedSession(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for SessionClient
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    /// Build the request-scoped client
    ///
    /// Reuses the session the route gate already resolved, so each
    /// navigation performs a single session lookup.
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let client = SessionClient::for_request(&app_state, jar);

        Ok(match parts.extensions.get::<ResolvedSession>() {
            Some(ResolvedSession(session)) => client.with_resolved(session.clone()),
            None => client,
        })
    }
}

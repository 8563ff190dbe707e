//! GoTrue REST client
//!
//! Talks to `<provider.url>/auth/v1`. Every request carries the public
//! `apikey` header; user-scoped calls add a bearer token.

use std::time::{Duration, Instant};

use axum::async_trait;
use axum::body::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::provider::{AuthProvider, ProviderError, SignUpOutcome, SignUpRequest, User};
use super::session::{Session, TokenResponse};
use crate::config::ProviderConfig;
use crate::metrics::{PROVIDER_REQUEST_DURATION_SECONDS, PROVIDER_REQUESTS_TOTAL};

/// HTTP client for a GoTrue-compatible identity provider
pub struct GoTrueClient {
    http: Client,
    auth_url: String,
    anon_key: String,
}

/// Error body shapes used by GoTrue versions
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    error_code: Option<String>,
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_error(self, status: StatusCode) -> ProviderError {
        let code = self.error_code.or_else(|| match self.code {
            Some(serde_json::Value::String(code)) => Some(code),
            _ => None,
        });
        let message = self
            .msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error.clone())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown provider error")
                    .to_string()
            });

        ProviderError::Api {
            status: status.as_u16(),
            code: code.or(self.error),
            message,
        }
    }
}

impl GoTrueClient {
    /// Build a client from provider configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("QuizGate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self::with_client(http, config))
    }

    /// Build a client around an existing `reqwest::Client`
    pub fn with_client(http: Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            auth_url: format!("{}/auth/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.auth_url, path))
            .header("apikey", &self.anon_key)
    }

    /// Send a request and decode a JSON body, recording metrics
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let body = self.send_raw(operation, request).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("{operation}: {e}")))
    }

    async fn send_raw(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Bytes, ProviderError> {
        let started = Instant::now();
        let result = request.send().await;
        PROVIDER_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                PROVIDER_REQUESTS_TOTAL
                    .with_label_values(&[operation, "transport_error"])
                    .inc();
                tracing::warn!(operation, %error, "Identity provider unreachable");
                return Err(error.into());
            }
        };

        let status = response.status();
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&[operation, status.as_str()])
            .inc();

        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(body);
        }

        let error_body: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        let error = error_body.into_error(status);
        tracing::debug!(operation, status = status.as_u16(), %error, "Identity provider rejected request");
        Err(error)
    }

    async fn token_grant(
        &self,
        operation: &str,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, ProviderError> {
        let request = self
            .request(reqwest::Method::POST, "/token")
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let response: TokenResponse = self.send(operation, request).await?;
        Ok(response.into())
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<Session, ProviderError> {
        self.token_grant(
            "exchange_code",
            "pkce",
            serde_json::json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier,
            }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.token_grant(
            "refresh_session",
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<User, ProviderError> {
        let request = self
            .request(reqwest::Method::GET, "/user")
            .bearer_auth(access_token);
        self.send("get_user", request).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        self.token_grant(
            "sign_in_with_password",
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_up(&self, request: &SignUpRequest<'_>) -> Result<SignUpOutcome, ProviderError> {
        let http_request = self
            .request(reqwest::Method::POST, "/signup")
            .query(&[("redirect_to", request.email_redirect_to)])
            .json(&serde_json::json!({
                "email": request.email,
                "password": request.password,
                "code_challenge": request.code_challenge,
                "code_challenge_method": "s256",
            }));
        let body: serde_json::Value = self.send("sign_up", http_request).await?;

        // Auto-confirmed projects answer with a session, others with the bare user.
        if body.get("access_token").is_some() {
            let response: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ProviderError::InvalidResponse(format!("sign_up: {e}")))?;
            let session = Session::from(response);
            return Ok(SignUpOutcome {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user = serde_json::from_value::<User>(user_value).ok();

        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let request = self
            .request(reqwest::Method::POST, "/logout")
            .query(&[("scope", "local")])
            .bearer_auth(access_token);
        self.send_raw("sign_out", request).await.map(|_| ())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let mut url = match url::Url::parse(&format!("{}/authorize", self.auth_url)) {
            Ok(url) => url,
            Err(error) => {
                tracing::error!(%error, auth_url = %self.auth_url, "Invalid provider URL");
                return format!("{}/authorize", self.auth_url);
            }
        };
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        url.to_string()
    }
}

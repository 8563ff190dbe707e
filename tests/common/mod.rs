//! Common test utilities for E2E tests
//!
//! Starts the application against a fake GoTrue server so the real HTTP
//! provider client is exercised end to end.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use quizgate::auth::session::{Session, encode_session_cookie};
use quizgate::auth::{GoTrueClient, User};
use quizgate::{AppState, config, data::Database};
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const COOKIE_NAME: &str = "qg-test-auth";
pub const VERIFIER_COOKIE: &str = "qg-test-auth-code-verifier";
pub const VALID_CODE: &str = "valid-code";
pub const PASSWORD_USER: &str = "user@example.com";
pub const PASSWORD: &str = "secret123";
pub const VALID_REFRESH: &str = "refresh-ok";
pub const SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";

/// One request seen by the fake provider
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub operation: String,
    pub body: Value,
    pub bearer: Option<String>,
}

type Calls = Arc<Mutex<Vec<ProviderCall>>>;

/// GoTrue stand-in listening on a random port
pub struct FakeProvider {
    pub addr: String,
    calls: Calls,
}

impl FakeProvider {
    pub async fn start() -> Self {
        let calls: Calls = Arc::default();
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/logout", post(logout))
            .with_state(calls.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, calls }
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.operation).collect()
    }
}

/// JWT-shaped access token carrying `sub` and `exp`
pub fn access_token(sub: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({ "sub": sub, "exp": exp }).to_string());
    format!("{header}.{claims}.signature")
}

fn claims(token: &str) -> Option<(String, i64)> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    Some((value["sub"].as_str()?.to_string(), value["exp"].as_i64()?))
}

fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{id}@example.com"),
        "user_metadata": { "full_name": "Test User" },
    })
}

fn token_response(user_id: &str) -> Value {
    let expires_at = Utc::now().timestamp() + 3600;
    json!({
        "access_token": access_token(user_id, expires_at),
        "refresh_token": format!("refresh-{user_id}"),
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": expires_at,
        "user": user_json(user_id),
    })
}

fn rejection(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn record(calls: &Calls, operation: &str, body: Value, headers: &HeaderMap) {
    calls.lock().unwrap().push(ProviderCall {
        operation: operation.to_string(),
        body,
        bearer: bearer(headers),
    });
}

#[derive(Deserialize)]
struct GrantQuery {
    grant_type: String,
}

async fn token(
    State(calls): State<Calls>,
    Query(query): Query<GrantQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record(&calls, &format!("token:{}", query.grant_type), body.clone(), &headers);
    if headers.get("apikey").is_none() {
        return rejection(StatusCode::UNAUTHORIZED, json!({ "message": "No API key found in request" }));
    }

    match query.grant_type.as_str() {
        "pkce" => {
            let verifier_ok = body["code_verifier"].as_str().is_some_and(|v| v.len() >= 43);
            if body["auth_code"] == VALID_CODE && verifier_ok {
                Json(token_response("code-user")).into_response()
            } else {
                rejection(
                    StatusCode::NOT_FOUND,
                    json!({
                        "code": 404,
                        "error_code": "flow_state_not_found",
                        "msg": "invalid flow state, no valid flow state found",
                    }),
                )
            }
        }
        "password" => match (body["email"].as_str(), body["password"].as_str()) {
            (Some(PASSWORD_USER), Some(PASSWORD)) => Json(token_response("password-user")).into_response(),
            (Some("unconfirmed@example.com"), _) => rejection(
                StatusCode::BAD_REQUEST,
                json!({ "error_code": "email_not_confirmed", "msg": "Email not confirmed" }),
            ),
            _ => rejection(
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
            ),
        },
        "refresh_token" => {
            if body["refresh_token"] == VALID_REFRESH {
                Json(token_response("refreshed-user")).into_response()
            } else {
                rejection(
                    StatusCode::BAD_REQUEST,
                    json!({ "error_code": "refresh_token_not_found", "msg": "Invalid Refresh Token: Refresh Token Not Found" }),
                )
            }
        }
        _ => rejection(StatusCode::BAD_REQUEST, json!({ "msg": "unsupported_grant_type" })),
    }
}

async fn user(State(calls): State<Calls>, headers: HeaderMap) -> Response {
    record(&calls, "user", Value::Null, &headers);
    let Some((sub, exp)) = bearer(&headers).as_deref().and_then(claims) else {
        return rejection(StatusCode::UNAUTHORIZED, json!({ "msg": "invalid JWT" }));
    };
    if exp <= Utc::now().timestamp() {
        return rejection(
            StatusCode::UNAUTHORIZED,
            json!({ "msg": "invalid JWT: unable to parse or verify signature, token is expired" }),
        );
    }
    Json(user_json(&sub)).into_response()
}

async fn signup(State(calls): State<Calls>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    record(&calls, "signup", body.clone(), &headers);
    match body["email"].as_str() {
        Some("instant@example.com") => Json(token_response("instant-user")).into_response(),
        Some("taken@example.com") => rejection(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": 422, "error_code": "user_already_exists", "msg": "User already registered" }),
        ),
        Some(_) => Json(user_json("pending-user")).into_response(),
        None => rejection(StatusCode::BAD_REQUEST, json!({ "msg": "email required" })),
    }
}

async fn logout(State(calls): State<Calls>, headers: HeaderMap) -> Response {
    record(&calls, "logout", Value::Null, &headers);
    StatusCode::NO_CONTENT.into_response()
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub provider: FakeProvider,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let provider = FakeProvider::start().await;

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            provider: config::ProviderConfig {
                url: provider.addr.clone(),
                anon_key: "test-anon-key".to_string(),
                timeout_seconds: 5,
            },
            auth: config::AuthConfig {
                cookie_name: COOKIE_NAME.to_string(),
                session_secret: SESSION_SECRET.to_string(),
                public_paths: vec!["/".to_string(), "/about".to_string(), "/contact".to_string()],
                min_password_length: 6,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let db = Database::connect(&config.database.path).await.unwrap();
        let gotrue = GoTrueClient::new(&config.provider).unwrap();
        let state = AppState::with_provider(config, db, Arc::new(gotrue));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let app = quizgate::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr,
            state,
            provider,
            _temp_dir: temp_dir,
            client: no_redirect_client(),
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// `Cookie` header value carrying a live session for `user_id`
    pub fn session_cookie(&self, user_id: &str) -> String {
        let expires_at = Utc::now().timestamp() + 3600;
        cookie_for(Session {
            access_token: access_token(user_id, expires_at),
            refresh_token: format!("refresh-{user_id}"),
            token_type: "bearer".to_string(),
            expires_at,
            user: serde_json::from_value::<User>(user_json(user_id)).unwrap(),
        })
    }

    /// `Cookie` header value carrying a session for `user_id` that
    /// expires at `expires_at`
    pub fn session_cookie_expiring_at(&self, user_id: &str, expires_at: i64) -> String {
        cookie_for(Session {
            access_token: access_token(user_id, expires_at),
            refresh_token: format!("refresh-{user_id}"),
            token_type: "bearer".to_string(),
            expires_at,
            user: serde_json::from_value::<User>(user_json(user_id)).unwrap(),
        })
    }

    /// `Cookie` header value carrying an expired session
    pub fn expired_session_cookie(&self, refresh_token: &str) -> String {
        let expires_at = Utc::now().timestamp() - 60;
        cookie_for(Session {
            access_token: access_token("stale-user", expires_at),
            refresh_token: refresh_token.to_string(),
            token_type: "bearer".to_string(),
            expires_at,
            user: serde_json::from_value::<User>(user_json("stale-user")).unwrap(),
        })
    }
}

fn cookie_for(session: Session) -> String {
    format!(
        "{COOKIE_NAME}={}",
        encode_session_cookie(&session, SESSION_SECRET).unwrap()
    )
}

/// `Cookie` header value carrying an unsigned session for `user_id`
pub fn unsigned_session_cookie(user_id: &str) -> String {
    let session = Session {
        access_token: "garbage".to_string(),
        refresh_token: "garbage".to_string(),
        token_type: "bearer".to_string(),
        expires_at: 4_000_000_000,
        user: serde_json::from_value::<User>(user_json(user_id)).unwrap(),
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&session).unwrap());
    format!("{COOKIE_NAME}={payload}")
}

/// `Cookie` header value carrying a session signed with the wrong key
pub fn foreign_session_cookie(user_id: &str) -> String {
    let session = Session {
        access_token: "garbage".to_string(),
        refresh_token: "garbage".to_string(),
        token_type: "bearer".to_string(),
        expires_at: 4_000_000_000,
        user: serde_json::from_value::<User>(user_json(user_id)).unwrap(),
    };
    let value = encode_session_cookie(&session, "some-other-secret-0123456789abcdef").unwrap();
    format!("{COOKIE_NAME}={value}")
}

/// Client that reports redirects instead of following them
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap()
}

/// `Location` header of a redirect response
pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `(name, value)` pairs of every `Set-Cookie` header
pub fn set_cookies(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| {
            let pair = value.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Value of the cookie `name` set by `response`, if any
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|(cookie, _)| cookie == name)
        .map(|(_, value)| value)
}

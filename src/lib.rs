//! QuizGate - quiz app with provider-backed session authentication
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Route gate middleware                                    │
//! │  - Auth callbacks and sign-in pages                         │
//! │  - Dashboard page and JSON API                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Dashboard summary                                        │
//! │  - Quiz creation and attempts                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────────┐  ┌───────────────────────────┐
//! │        Data Layer            │  │    Identity provider      │
//! │  - SQLite (sqlx)             │  │  - GoTrue REST (reqwest)  │
//! └──────────────────────────────┘  └───────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: Dashboard and quiz handlers
//! - `auth`: Sessions, callbacks, route gate
//! - `service`: Business logic layer
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request. Request-scoped auth state lives in
/// [`auth::SessionClient`], never here.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Identity provider client
    pub provider: Arc<dyn auth::AuthProvider>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Build the identity provider client
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        use std::path::Path;

        tracing::info!("Initializing application state...");

        let db = data::Database::connect(Path::new(&config.database.path)).await?;
        tracing::info!("Database connected");

        let provider = auth::GoTrueClient::new(&config.provider)?;
        tracing::info!(url = %config.provider.url, "Identity provider client initialized");

        Ok(Self::with_provider(config, db, Arc::new(provider)))
    }

    /// Assemble state from already constructed parts
    pub fn with_provider(
        config: config::AppConfig,
        db: data::Database,
        provider: Arc<dyn auth::AuthProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            provider,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/", axum::routing::get(home_page))
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::pages_router())
        .nest("/api", api::api_router())
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::route_gate,
        ))
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn home_page(
    auth::MaybeUser(session): auth::MaybeUser,
) -> axum::response::Html<&'static str> {
    let page = if session.is_some() {
        r#"<!DOCTYPE html><html><head><title>QuizGate</title></head><body><h1>QuizGate</h1><a href="/dashboard">Go to dashboard</a></body></html>"#
    } else {
        r#"<!DOCTYPE html><html><head><title>QuizGate</title></head><body><h1>QuizGate</h1><a href="/auth">Sign in</a></body></html>"#
    };
    axum::response::Html(page)
}

async fn not_found() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "Not Found")
}

async fn health_check() -> &'static str {
    "OK"
}

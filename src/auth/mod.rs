//! Session authentication against the hosted auth provider
//!
//! Handles:
//! - Code, hash-fragment and OAuth callbacks
//! - Session cookies and refresh
//! - Route gate middleware
//! - Sign-in / sign-up pages

mod callback;
pub mod client;
pub mod fragment;
mod gotrue;
mod middleware;
mod pages;
pub mod provider;
pub mod session;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use callback::sign_in_error_url;
pub use client::{CookieSettings, ResolvedSession, SessionAccess, SessionClient};
pub use fragment::{CallbackOutcome, handle_hash_callback, handle_oauth_callback};
pub use gotrue::GoTrueClient;
pub use middleware::{CurrentUser, GateDecision, MaybeUser, RouteClass, decide, route_gate};
pub use pages::{FormMode, describe_auth_error};
pub use provider::{AuthProvider, ProviderError, SignUpOutcome, TokenPair, User};
pub use session::Session;

/// Create auth router
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(pages::auth_page))
        .route("/auth/sign-in", post(pages::sign_in))
        .route("/auth/sign-up", post(pages::sign_up))
        .route("/auth/oauth/:provider", get(pages::oauth_start))
        .route("/auth/callback", get(callback::code_callback))
        .route(
            "/auth/handle-hash-callback",
            get(callback::hash_callback_page).post(callback::hash_callback),
        )
        .route(
            "/auth/oauth-callback",
            get(callback::oauth_callback_page).post(callback::oauth_callback),
        )
        .route("/sign-out", post(pages::sign_out))
}

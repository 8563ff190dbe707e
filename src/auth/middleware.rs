//! Route gate and session extractors
//!
//! The gate runs before every non-exempt route. It resolves the session
//! once, decides whether the navigation may proceed, and leaves the
//! resolved session in the request extensions for handlers.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use super::client::{ResolvedSession, SessionClient};
use super::fragment::{DASHBOARD_PATH, SIGN_IN_PATH};
use super::session::Session;
use crate::AppState;
use crate::error::AppError;
use crate::metrics::ROUTE_GATE_DECISIONS_TOTAL;

/// Path prefixes the gate never runs for
const EXEMPT_PREFIXES: &[&str] = &["/static/", "/images/"];

/// Exact paths the gate never runs for
const EXEMPT_PATHS: &[&str] = &["/favicon.ico", "/health", "/metrics"];

/// Suffixes of static assets the gate never runs for
const EXEMPT_SUFFIXES: &[&str] = &[".svg"];

/// Callback routes that must work with or without a session
const CALLBACK_PATHS: &[&str] = &[
    "/auth/callback",
    "/auth/handle-hash-callback",
    "/auth/oauth-callback",
];

/// Whether the gate is skipped entirely for `path`
pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
        || EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || EXEMPT_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

fn is_under(path: &str, base: &str) -> bool {
    path == base
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// How the gate sees a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteClass {
    pub auth_page: bool,
    pub public: bool,
    pub api: bool,
    pub callback: bool,
}

impl RouteClass {
    pub fn classify(path: &str, public_paths: &[String]) -> Self {
        Self {
            auth_page: is_under(path, SIGN_IN_PATH),
            public: public_paths.iter().any(|public| public == path),
            api: is_under(path, "/api"),
            callback: CALLBACK_PATHS.iter().any(|callback| is_under(path, callback)),
        }
    }
}

/// Outcome of the gate for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    RedirectToSignIn,
    RedirectToDashboard,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Proceed => "proceed",
            GateDecision::RedirectToSignIn => "redirect_sign_in",
            GateDecision::RedirectToDashboard => "redirect_dashboard",
        }
    }
}

/// Decide a navigation from session presence and route class
///
/// Pure, so the same request state always yields the same decision.
pub fn decide(has_session: bool, route: RouteClass) -> GateDecision {
    if route.callback {
        return GateDecision::Proceed;
    }
    if !has_session && !route.auth_page && !route.public && !route.api {
        return GateDecision::RedirectToSignIn;
    }
    if has_session && route.auth_page {
        return GateDecision::RedirectToDashboard;
    }
    GateDecision::Proceed
}

/// Route gate middleware
///
/// Lookup errors are logged and treated as "no session"; they never fail
/// the request. Cookies refreshed during the lookup are written onto the
/// response unless the handler already set the same cookie.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/dashboard", get(...))
///     .layer(middleware::from_fn_with_state(state, route_gate));
/// ```
pub async fn route_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if is_exempt(&path) {
        return next.run(request).await;
    }

    let mut client = SessionClient::for_request(&state, jar);
    let session = match client.get_session().await {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(%error, path = %path, "Session lookup failed in route gate");
            None
        }
    };

    let route = RouteClass::classify(&path, &state.config.auth.public_paths);
    let decision = decide(session.is_some(), route);
    ROUTE_GATE_DECISIONS_TOTAL
        .with_label_values(&[decision.as_str()])
        .inc();
    tracing::debug!(path = %path, decision = decision.as_str(), "Route gate decision");

    let jar = client.into_jar();
    match decision {
        GateDecision::RedirectToSignIn => (jar, Redirect::to(SIGN_IN_PATH)).into_response(),
        GateDecision::RedirectToDashboard => (jar, Redirect::to(DASHBOARD_PATH)).into_response(),
        GateDecision::Proceed => {
            request.extensions_mut().insert(ResolvedSession(session));
            let mut response = next.run(request).await;
            append_missing_cookies(response.headers_mut(), jar.into_response().headers());
            response
        }
    }
}

/// Copy `Set-Cookie` headers from `gate` unless the handler set that cookie
fn append_missing_cookies(response: &mut HeaderMap, gate: &HeaderMap) {
    let already_set: Vec<String> = response
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(cookie_name)
        .map(ToOwned::to_owned)
        .collect();

    for value in gate.get_all(header::SET_COOKIE) {
        let name = value.to_str().ok().and_then(cookie_name);
        if name.is_some_and(|name| already_set.iter().any(|set| set == name)) {
            continue;
        }
        response.append(header::SET_COOKIE, value.clone());
    }
}

fn cookie_name(set_cookie: &str) -> Option<&str> {
    set_cookie.split_once('=').map(|(name, _)| name.trim())
}

async fn resolve_session<S>(parts: &mut Parts, state: &S) -> Option<Session>
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    if let Some(ResolvedSession(session)) = parts.extensions.get::<ResolvedSession>() {
        return session.clone();
    }

    let app_state = AppState::from_ref(state);
    let mut client =
        SessionClient::for_request(&app_state, CookieJar::from_headers(&parts.headers));
    let session = match client.get_session().await {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(%error, "Session lookup failed");
            None
        }
    };
    parts
        .extensions
        .insert(ResolvedSession(session.clone()));
    session
}

/// Extractor for current authenticated user
///
/// Use in handlers to get the current session.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(session): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", session.user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state)
            .await
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve_session(parts, state).await))
    }
}

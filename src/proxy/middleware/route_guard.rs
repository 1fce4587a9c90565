//! Session resolution and role-based route guard
//!
//! Every request gets its session (if any) resolved from the signed cookie
//! and placed in the request extensions. Requests under `/admin` or
//! `/instructor` additionally pass through `decide`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::SignedCookieJar;

use crate::modules::session::{Role, Session, SESSION_COOKIE_NAME};
use crate::proxy::server::AppState;

pub const LOGIN_PATH: &str = "/login";
const ADMIN_PREFIX: &str = "/admin";
const INSTRUCTOR_PREFIX: &str = "/instructor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(&'static str),
}

fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn is_protected_path(path: &str) -> bool {
    is_under(path, ADMIN_PREFIX) || is_under(path, INSTRUCTOR_PREFIX)
}

/// Guard decision for a protected path. Pure and idempotent.
pub fn decide(role: Option<Role>, path: &str) -> GuardDecision {
    match role {
        None => GuardDecision::Redirect(LOGIN_PATH),
        Some(Role::Admin) if is_under(path, INSTRUCTOR_PREFIX) => {
            GuardDecision::Redirect(Role::Admin.landing_path())
        }
        Some(Role::Instructor) if is_under(path, ADMIN_PREFIX) => {
            GuardDecision::Redirect(Role::Instructor.landing_path())
        }
        Some(_) => GuardDecision::Proceed,
    }
}

/// Session id from the signed cookie, if present and untampered
pub fn session_id(jar: &SignedCookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty())
}

/// Route guard middleware
pub async fn route_guard_middleware(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let session: Option<Session> = match session_id(&jar) {
        Some(id) => state.sessions.refresh(&id).await,
        None => None,
    };

    if is_protected_path(&path) {
        match decide(session.as_ref().map(|s| s.role), &path) {
            GuardDecision::Proceed => {
                tracing::debug!("route_guard: {} allowed", path);
            }
            GuardDecision::Redirect(target) => {
                tracing::info!(
                    "route_guard: {} denied for {}, redirecting to {}",
                    path,
                    session
                        .as_ref()
                        .map(|s| s.role.to_string())
                        .unwrap_or_else(|| "anonymous".to_string()),
                    target
                );
                return Redirect::to(target).into_response();
            }
        }
    }

    if let Some(session) = session {
        request.extensions_mut().insert(session);
    }

    next.run(request).await
}

//! Sign-in, sign-out, password reset and password change
//!
//! The session id travels in a signed cookie; the bearer token never leaves
//! the server.

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::SignedCookieJar;
use minijinja::context;
use serde::Deserialize;

use crate::modules::credentials::{self, AuthError};
use crate::modules::session::SESSION_COOKIE_NAME;
use crate::proxy::middleware::route_guard::{session_id, LOGIN_PATH};
use crate::proxy::server::AppState;
use crate::proxy::upstream::resources;
use crate::proxy::views::Page;

fn session_cookie(id: String, ttl: chrono::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

/// `/` sends users to their dashboard, or to sign-in
pub async fn index(page: Page) -> Redirect {
    match &page.session {
        Some(session) => Redirect::to(session.role.landing_path()),
        None => Redirect::to(LOGIN_PATH),
    }
}

pub async fn login_page(State(state): State<AppState>, page: Page) -> Response {
    if let Some(session) = &page.session {
        return Redirect::to(session.role.landing_path()).into_response();
    }
    state.views.render(&page, "login.html", context! {})
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    page: Page,
    Form(form): Form<LoginForm>,
) -> Response {
    match credentials::exchange(&state.upstream, &form.email, &form.password).await {
        Ok(seed) => {
            let landing = seed.role.landing_path();
            let id = state.sessions.create(seed).await;
            let jar = jar.add(session_cookie(id, state.sessions.ttl()));
            (jar, Redirect::to(landing)).into_response()
        }
        Err(e) => {
            let message = match e {
                AuthError::InvalidCredentials => "Invalid email or password",
                AuthError::MalformedToken(_) => {
                    "Sign-in succeeded but the session token could not be read"
                }
            };
            state.views.render_with_status(
                &page,
                StatusCode::UNAUTHORIZED,
                "login.html",
                context! { error => message, email => form.email.trim() },
            )
        }
    }
}

pub async fn logout(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    if let Some(id) = session_id(&jar) {
        state.sessions.delete(&id).await;
        tracing::info!("session signed out");
    }

    let jar = jar.add(expired_session_cookie());
    (jar, Redirect::to(LOGIN_PATH)).into_response()
}

// ===== Password reset (OTP) =====

#[derive(Deserialize)]
pub struct OtpRequestForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct OtpVerifyForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Deserialize)]
pub struct OtpResetForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

pub async fn forgot_password_page(State(state): State<AppState>, page: Page) -> Response {
    state
        .views
        .render(&page, "forgot_password.html", context! { step => "request" })
}

pub async fn forgot_password_request(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<OtpRequestForm>,
) -> Response {
    let email = form.email.trim();
    if email.is_empty() {
        return state.views.render_with_status(
            &page,
            StatusCode::BAD_REQUEST,
            "forgot_password.html",
            context! { step => "request", error => "Email is required" },
        );
    }

    match resources::generate_otp(&state.upstream, email).await {
        Ok(()) => state.views.render(
            &page,
            "forgot_password.html",
            context! { step => "verify", email => email, notice => "A verification code has been sent" },
        ),
        Err(e) => state.views.render_with_status(
            &page,
            e.status(),
            "forgot_password.html",
            context! { step => "request", email => email, error => e.user_message() },
        ),
    }
}

pub async fn forgot_password_verify(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<OtpVerifyForm>,
) -> Response {
    let email = form.email.trim();
    let otp = form.otp.trim();
    if email.is_empty() || otp.is_empty() {
        return state.views.render_with_status(
            &page,
            StatusCode::BAD_REQUEST,
            "forgot_password.html",
            context! { step => "verify", email => email, error => "Enter the code you received" },
        );
    }

    match resources::validate_otp(&state.upstream, email, otp).await {
        Ok(()) => state.views.render(
            &page,
            "forgot_password.html",
            context! { step => "reset", email => email, otp => otp },
        ),
        Err(e) => state.views.render_with_status(
            &page,
            e.status(),
            "forgot_password.html",
            context! { step => "verify", email => email, error => e.user_message() },
        ),
    }
}

pub async fn forgot_password_reset(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<OtpResetForm>,
) -> Response {
    let email = form.email.trim();
    let otp = form.otp.trim();

    if let Some(problem) = password_problem(&form.new_password, &form.confirm_password) {
        return state.views.render_with_status(
            &page,
            StatusCode::BAD_REQUEST,
            "forgot_password.html",
            context! { step => "reset", email => email, otp => otp, error => problem },
        );
    }

    match resources::reset_password_with_otp(&state.upstream, email, otp, &form.new_password).await {
        Ok(()) => state.views.render(
            &page,
            "login.html",
            context! { email => email, notice => "Password updated. Please sign in." },
        ),
        Err(e) => state.views.render_with_status(
            &page,
            e.status(),
            "forgot_password.html",
            context! { step => "reset", email => email, otp => otp, error => e.user_message() },
        ),
    }
}

// ===== Password change (signed in) =====

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

pub async fn settings_page(State(state): State<AppState>, page: Page, uri: Uri) -> Response {
    state
        .views
        .render(&page, "settings.html", context! { action => uri.path() })
}

pub async fn settings_submit(
    State(state): State<AppState>,
    page: Page,
    uri: Uri,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    let action = uri.path();

    let problem = if form.current_password.is_empty() {
        Some("Current password is required")
    } else {
        password_problem(&form.new_password, &form.confirm_password)
    };
    if let Some(problem) = problem {
        return state.views.render_with_status(
            &page,
            StatusCode::BAD_REQUEST,
            "settings.html",
            context! { action => action, error => problem },
        );
    }

    match resources::change_password(
        &state.upstream,
        page.token(),
        &form.current_password,
        &form.new_password,
    )
    .await
    {
        Ok(()) => state.views.render(
            &page,
            "settings.html",
            context! { action => action, notice => "Password updated" },
        ),
        Err(e) if e.is_unauthorized() => {
            state.views.upstream_failure(&state, &page, "Settings", e).await
        }
        Err(e) => state.views.render_with_status(
            &page,
            e.status(),
            "settings.html",
            context! { action => action, error => e.user_message() },
        ),
    }
}

fn password_problem(new_password: &str, confirm_password: &str) -> Option<&'static str> {
    if new_password.is_empty() {
        Some("New password is required")
    } else if new_password != confirm_password {
        Some("Passwords do not match")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::credentials::tests::make_token;
    use crate::proxy::config::ProxyConfig;
    use crate::proxy::server::build_router;
    use crate::proxy::test_support::spawn_upstream;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn login_upstream(role: &'static str) -> Router {
        Router::new().route(
            "/auth/login",
            post(move |Json(body): Json<Value>| async move {
                if body["password"] == "right" {
                    let token = make_token(json!({ "sub": "9", "role": role, "firstName": "Ana", "lastName": "Lee" }));
                    (StatusCode::OK, Json(json!({ "payload": { "accessToken": token } })))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" })))
                }
            }),
        )
    }

    async fn app_with(upstream: Router) -> (Router, AppState) {
        let origin = spawn_upstream(upstream).await;
        let config = ProxyConfig {
            upstream_origin: origin,
            ..ProxyConfig::default()
        };
        let state = AppState::from_config(&config).unwrap();
        (build_router(state.clone()), state)
    }

    fn login_request(email: &str, password: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("email={}&password={}", email, password)))
            .unwrap()
    }

    fn cookie_from(response: &Response) -> String {
        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_password_problem() {
        assert_eq!(password_problem("", ""), Some("New password is required"));
        assert_eq!(password_problem("a", "b"), Some("Passwords do not match"));
        assert_eq!(password_problem("a", "a"), None);
    }

    #[tokio::test]
    async fn test_login_redirects_to_role_landing_and_guards_other_role() {
        let (app, state) = app_with(login_upstream("INSTRUCTOR")).await;

        let response = app.clone().oneshot(login_request("ana%40x.edu", "right")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/instructor");
        assert_eq!(state.sessions.len().await, 1);
        let cookie = cookie_from(&response);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/admin/rooms")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/instructor");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logout")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert_eq!(state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_login_creates_no_session() {
        let (app, state) = app_with(login_upstream("ADMIN")).await;

        let response = app.clone().oneshot(login_request("ana%40x.edu", "wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = app.oneshot(login_request("", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_anonymous() {
        let (app, _) = app_with(login_upstream("ADMIN")).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin")
                    .header(header::COOKIE, format!("{}=forged-session-id", SESSION_COOKIE_NAME))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }
}

//! Server-rendered pages
//!
//! Templates are compiled into the binary and rendered with minijinja.
//! Every render receives the request's theme context and session explicitly.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::{CookieJar, SignedCookieJar};
use minijinja::{context, Environment};
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;

use crate::modules::session::Session;
use crate::modules::theme::{ThemeContext, ThemePreference, THEME_COOKIE_NAME};
use crate::proxy::middleware::route_guard::{session_id, LOGIN_PATH};
use crate::proxy::server::AppState;
use crate::proxy::upstream::envelope::ApiError;

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../../templates/layout.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("forgot_password.html", include_str!("../../templates/forgot_password.html")),
    ("admin_dashboard.html", include_str!("../../templates/admin_dashboard.html")),
    ("instructor_dashboard.html", include_str!("../../templates/instructor_dashboard.html")),
    ("table.html", include_str!("../../templates/table.html")),
    ("detail.html", include_str!("../../templates/detail.html")),
    ("settings.html", include_str!("../../templates/settings.html")),
    ("error.html", include_str!("../../templates/error.html")),
];

pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, String> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .map_err(|e| format!("Failed to compile template {}: {}", name, e))?;
        }
        Ok(Self { env })
    }

    /// Render `template` with the page's theme and session merged into `ctx`
    pub fn render(&self, page: &Page, template: &str, ctx: minijinja::Value) -> Response {
        self.render_with_status(page, StatusCode::OK, template, ctx)
    }

    pub fn render_with_status(
        &self,
        page: &Page,
        status: StatusCode,
        template: &str,
        ctx: minijinja::Value,
    ) -> Response {
        let full = context! {
            theme => page.theme,
            session => page.session.as_ref(),
            ..ctx
        };

        let rendered = self
            .env
            .get_template(template)
            .and_then(|tmpl| tmpl.render(full));

        match rendered {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(op = "render", template, error = %e, "template rendering failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
            }
        }
    }

    /// Page for an upstream failure; a rejected token ends the local session
    pub async fn upstream_failure(
        &self,
        state: &AppState,
        page: &Page,
        title: &str,
        err: ApiError,
    ) -> Response {
        if err.is_unauthorized() {
            if let Some(id) = &page.session_id {
                state.sessions.delete(id).await;
            }
            tracing::info!("upstream rejected session token, signing out");
            return Redirect::to(LOGIN_PATH).into_response();
        }

        self.render_with_status(
            page,
            err.status(),
            "error.html",
            context! { title => title, message => err.user_message() },
        )
    }
}

/// Per-request rendering inputs
pub struct Page {
    pub theme: ThemeContext,
    pub session: Option<Session>,
    pub session_id: Option<String>,
}

impl Page {
    /// Bearer token of the current session; empty for anonymous pages
    pub fn token(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.bearer_token.as_str())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Page {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = CookieJar::from_headers(&parts.headers);
        let preference = cookies
            .get(THEME_COOKIE_NAME)
            .and_then(|c| ThemePreference::parse(c.value()));

        let signed = SignedCookieJar::from_headers(&parts.headers, state.cookie_key.clone());

        Ok(Self {
            theme: ThemeContext::now(preference),
            session: parts.extensions.get::<Session>().cloned(),
            session_id: session_id(&signed),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TableRow {
    pub id: Option<String>,
    pub cells: Vec<String>,
    pub href: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Field {
    pub label: String,
    pub value: String,
}

/// Flatten a record into label/value pairs for a detail page
pub fn fields_of<T: Serialize>(record: &T) -> Vec<Field> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| Field {
                label: k,
                value: display_value(&v),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Human-readable rendering of a JSON value
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => value.to_string(),
        },
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::modules::theme::{ThemePreference, THEME_COOKIE_NAME};

#[derive(Deserialize)]
pub struct ThemeForm {
    #[serde(default)]
    pub theme: String,
}

/// Store the theme preference and go back to the page it was chosen on
pub async fn set_theme(jar: CookieJar, headers: HeaderMap, Form(form): Form<ThemeForm>) -> Response {
    let Some(preference) = ThemePreference::parse(&form.theme) else {
        return (StatusCode::BAD_REQUEST, "Unknown theme").into_response();
    };

    let cookie = Cookie::build((THEME_COOKIE_NAME, preference.as_str()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(365))
        .build();

    (jar.add(cookie), Redirect::to(&back_target(&headers))).into_response()
}

/// Referer path when it points back into this site, `/` otherwise
fn back_target(headers: &HeaderMap) -> String {
    let Some(referer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) else {
        return "/".to_string();
    };

    let path = match referer.parse::<axum::http::Uri>() {
        Ok(uri) if uri.authority().is_none() || same_host(&uri, headers) => uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        _ => return "/".to_string(),
    };

    if path.starts_with('/') && !path.starts_with("//") {
        path
    } else {
        "/".to_string()
    }
}

fn same_host(uri: &axum::http::Uri, headers: &HeaderMap) -> bool {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    matches!((uri.authority(), host), (Some(a), Some(h)) if a.as_str() == h)
}

//! Credential exchange against the upstream issuer
//!
//! The returned bearer token is decoded, NOT verified. Signature checks
//! belong to the upstream that issued it.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::modules::session::{Role, SessionSeed};
use crate::proxy::upstream::client::UpstreamClient;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::MalformedToken(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// Exchange email + password for a session seed
pub async fn exchange(
    upstream: &UpstreamClient,
    email: &str,
    password: &str,
) -> Result<SessionSeed, AuthError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        tracing::warn!(op = "login", "rejected login with missing email or password");
        return Err(AuthError::InvalidCredentials);
    }

    let payload: Value = upstream
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(&json!({ "email": email, "password": password })),
        )
        .await
        .map_err(|e| {
            tracing::warn!(op = "login", email = %email, error = %e, "upstream login failed");
            AuthError::InvalidCredentials
        })?;

    let token = access_token(&payload).ok_or_else(|| {
        tracing::warn!(op = "login", email = %email, "login payload carried no access token");
        AuthError::InvalidCredentials
    })?;

    let seed = seed_from_token(&token, email).map_err(|e| {
        tracing::error!(op = "login", email = %email, error = %e, "could not read token claims");
        e
    })?;

    tracing::info!(
        op = "login",
        subject = %seed.subject_id,
        role = %seed.role,
        "credential exchange succeeded"
    );
    Ok(seed)
}

/// The login payload is either the token itself or an object holding it
fn access_token(payload: &Value) -> Option<String> {
    let token = match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["accessToken", "access_token", "token"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    }?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Decode the claims segment of a JWT without checking its signature
pub fn decode_claims(token: &str) -> Result<Map<String, Value>, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(claims)) = (segments.next(), segments.next()) else {
        return Err(AuthError::MalformedToken("expected header.claims.signature".to_string()));
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(claims.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("claims are not base64url: {}", e)))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuthError::MalformedToken("claims are not a JSON object".to_string())),
        Err(e) => Err(AuthError::MalformedToken(format!("claims are not JSON: {}", e))),
    }
}

/// Build a session seed from a bearer token; `login_email` fills a missing email claim
pub fn seed_from_token(token: &str, login_email: &str) -> Result<SessionSeed, AuthError> {
    let claims = decode_claims(token)?;

    let role_claim = claim_str(&claims, &["role"])
        .ok_or_else(|| AuthError::MalformedToken("missing role claim".to_string()))?;
    let role = Role::from_claim(&role_claim)
        .ok_or_else(|| AuthError::MalformedToken(format!("unknown role {:?}", role_claim)))?;

    let subject_id = claim_str(&claims, &["sub", "id", "userId"]).unwrap_or_default();
    let email = claim_str(&claims, &["email"]).unwrap_or_else(|| login_email.to_string());

    let display_name = derive_display_name(
        claim_str(&claims, &["firstName", "first_name"]).as_deref(),
        claim_str(&claims, &["lastName", "last_name"]).as_deref(),
        claim_str(&claims, &["name"]).as_deref(),
        &email,
    );

    let token_expiry = claims
        .get("exp")
        .and_then(Value::as_f64)
        .and_then(|exp| DateTime::<Utc>::from_timestamp(exp as i64, 0));

    Ok(SessionSeed {
        subject_id,
        role,
        display_name,
        email,
        bearer_token: token.to_string(),
        token_expiry,
    })
}

/// First/last name, else name, else the local part of the email
pub fn derive_display_name(
    first_name: Option<&str>,
    last_name: Option<&str>,
    name: Option<&str>,
    email: &str,
) -> String {
    fn non_empty(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }

    if let (Some(first), Some(last)) = (non_empty(first_name), non_empty(last_name)) {
        return format!("{} {}", first, last);
    }
    if let Some(name) = non_empty(name) {
        return name.to_string();
    }
    email.split('@').next().unwrap_or_default().to_string()
}

/// String claim under any of the given keys; numeric ids are stringified
fn claim_str(claims: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match claims.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

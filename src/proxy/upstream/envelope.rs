//! Upstream response envelope
//!
//! Every upstream body is `{ "payload": ..., "message": ... }`. A 2xx without
//! `payload` is a data-structure error, never an empty default.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

pub const MISSING_PAYLOAD_MESSAGE: &str = "Invalid data structure received from server";

/// Tagged upstream result: success carries the payload, failure the message
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Payload(T),
    Failure { status: StatusCode, message: String },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("upstream unreachable: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: StatusCode, message: String },
    #[error("{}", MISSING_PAYLOAD_MESSAGE)]
    MissingPayload,
    #[error("unexpected payload shape: {0}")]
    Decode(String),
}

impl ApiError {
    /// Status a caller-facing response should carry
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Transport(_) => StatusCode::BAD_GATEWAY,
            ApiError::Upstream { status, .. } => *status,
            ApiError::MissingPayload | ApiError::Decode(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Upstream { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "message": self.user_message() }))).into_response()
    }
}

/// Interpret an upstream status and body
pub fn parse_envelope(status: StatusCode, body: &[u8]) -> Result<Envelope<Value>, ApiError> {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(message_text)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Upstream request failed")
                    .to_string()
            });
        return Ok(Envelope::Failure { status, message });
    }

    match parsed {
        Some(Value::Object(mut map)) => match map.remove("payload") {
            Some(payload) => Ok(Envelope::Payload(payload)),
            None => Err(ApiError::MissingPayload),
        },
        _ => Err(ApiError::MissingPayload),
    }
}

/// `message` is a string, or a list of strings for validation errors
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_present() {
        let env = parse_envelope(StatusCode::OK, br#"{"payload":[1,2],"message":"ok"}"#).unwrap();
        assert_eq!(env, Envelope::Payload(json!([1, 2])));
    }

    #[test]
    fn test_null_payload_counts_as_present() {
        let env = parse_envelope(StatusCode::OK, br#"{"payload":null}"#).unwrap();
        assert_eq!(env, Envelope::Payload(Value::Null));
    }

    #[test]
    fn test_missing_payload_is_error() {
        let err = parse_envelope(StatusCode::OK, br#"{"data":[]}"#).unwrap_err();
        assert!(matches!(err, ApiError::MissingPayload));
        assert_eq!(err.to_string(), MISSING_PAYLOAD_MESSAGE);

        let err = parse_envelope(StatusCode::CREATED, b"not json").unwrap_err();
        assert!(matches!(err, ApiError::MissingPayload));
    }

    #[test]
    fn test_failure_message() {
        let env = parse_envelope(StatusCode::BAD_REQUEST, br#"{"message":["name is required","capacity must be positive"]}"#)
            .unwrap();
        assert_eq!(
            env,
            Envelope::Failure {
                status: StatusCode::BAD_REQUEST,
                message: "name is required; capacity must be positive".to_string()
            }
        );

        let env = parse_envelope(StatusCode::NOT_FOUND, b"").unwrap();
        assert_eq!(
            env,
            Envelope::Failure {
                status: StatusCode::NOT_FOUND,
                message: "Not Found".to_string()
            }
        );
    }
}

// Reverse proxy handler: everything under the reserved prefix goes upstream
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;

use crate::modules::session::Session;
use crate::proxy::server::AppState;
use crate::proxy::upstream::client::{is_hop_by_hop, ProxiedRequest};

/// Forward one request upstream and stream the answer back.
/// Upstream error statuses pass through untouched; only transport failures become a 500 here.
pub async fn handle_proxy(
    State(state): State<AppState>,
    session: Option<Extension<Session>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound_path = uri.path().to_string();
    let upstream_path = state.remap.remap(&inbound_path);
    let token = session.as_ref().map(|Extension(s)| s.bearer_token.as_str());

    let request = ProxiedRequest {
        method,
        inbound_path: inbound_path.clone(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };

    match state.upstream.forward(&upstream_path, request, token).await {
        Ok(upstream_response) => passthrough_response(upstream_response),
        Err(e) => {
            tracing::error!(
                op = "proxy",
                path = %inbound_path,
                upstream_path = %upstream_path,
                error = %e,
                "upstream request failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": "Failed to reach upstream API",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Status, headers and a streaming body taken from the upstream response
fn passthrough_response(upstream_response: reqwest::Response) -> Response {
    let status = upstream_response.status();
    let upstream_headers = upstream_response.headers().clone();

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in upstream_headers.iter() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use crate::modules::credentials::tests::make_token;
    use crate::modules::credentials::seed_from_token;
    use crate::proxy::config::ProxyConfig;
    use crate::proxy::server::{build_router, AppState};
    use crate::proxy::test_support::spawn_upstream;
    use axum::body::{Body, Bytes};
    use axum::extract::Request;
    use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::routing::any;
    use axum::{Json, Router};
    use axum_extra::extract::cookie::Cookie;
    use axum_extra::extract::SignedCookieJar;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::modules::session::SESSION_COOKIE_NAME;

    /// Upstream that echoes what it received
    fn echo_upstream() -> Router {
        Router::new()
            .fallback(|method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                Json(json!({
                    "method": method.as_str(),
                    "path": uri.path(),
                    "query": uri.query(),
                    "host": header("host"),
                    "bypass": header("ngrok-skip-browser-warning"),
                    "authorization": header("authorization"),
                    "cookie": header("cookie"),
                    "body": String::from_utf8_lossy(&body),
                }))
            })
            .route(
                "/broken",
                any(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "bad" }))) }),
            )
    }

    fn state_for(origin: &str) -> AppState {
        let config = ProxyConfig {
            upstream_origin: origin.to_string(),
            ..ProxyConfig::default()
        };
        AppState::from_config(&config).unwrap()
    }

    async fn send(app: &Router, request: Request) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_path_query_and_headers_forwarded() {
        let origin = spawn_upstream(echo_upstream()).await;
        let app = build_router(state_for(&origin));

        let request = Request::builder()
            .uri("/api/room/3?building=A&sort=name%20asc")
            .header(header::HOST, "portal.local")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let echoed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(echoed["path"], "/room/3");
        assert_eq!(echoed["query"], "building=A&sort=name%20asc");
        assert_eq!(echoed["host"], origin.trim_start_matches("http://"));
        assert_eq!(echoed["bypass"], "true");
        assert_eq!(echoed["authorization"], Value::Null);
    }

    #[tokio::test]
    async fn test_profile_path_special_case() {
        let origin = spawn_upstream(echo_upstream()).await;
        let app = build_router(state_for(&origin));

        let request = Request::builder()
            .uri("/api/profile?fields=all")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = send(&app, request).await;
        let echoed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(echoed["path"], "/auth/profile");
        assert_eq!(echoed["query"], "fields=all");
    }

    #[tokio::test]
    async fn test_body_forwarded_byte_for_byte_except_get() {
        let origin = spawn_upstream(echo_upstream()).await;
        let app = build_router(state_for(&origin));
        let payload = r#"{"name":"B-204","capacity":40}"#;

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/api/room/9")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .unwrap();
        let (_, _, body) = send(&app, request).await;
        let echoed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(echoed["method"], "PUT");
        assert_eq!(echoed["body"], payload);

        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/room")
            .body(Body::from(payload))
            .unwrap();
        let (_, _, body) = send(&app, request).await;
        let echoed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(echoed["body"], "");
    }

    #[tokio::test]
    async fn test_session_token_injected() {
        let origin = spawn_upstream(echo_upstream()).await;
        let state = state_for(&origin);
        let token = make_token(json!({ "sub": "1", "role": "ADMIN" }));
        let session_id = state
            .sessions
            .create(seed_from_token(&token, "a@x.edu").unwrap())
            .await;

        let jar = SignedCookieJar::new(state.cookie_key.clone())
            .add(Cookie::new(SESSION_COOKIE_NAME, session_id));
        let cookie_header = jar
            .into_response()
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let app = build_router(state);
        let request = Request::builder()
            .uri("/api/class")
            .header(header::COOKIE, cookie_header)
            .header(header::AUTHORIZATION, "Bearer forged")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = send(&app, request).await;
        let echoed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(echoed["authorization"], format!("Bearer {}", token));
        assert_eq!(echoed["cookie"], Value::Null);
    }

    #[tokio::test]
    async fn test_upstream_error_passes_through() {
        let origin = spawn_upstream(echo_upstream()).await;
        let app = build_router(state_for(&origin));

        let request = Request::builder().uri("/api/broken").body(Body::empty()).unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(&body[..], br#"{"message":"bad"}"#);
    }

    #[tokio::test]
    async fn test_transport_failure_yields_error_envelope() {
        let app = build_router(state_for("http://127.0.0.1:1"));

        let request = Request::builder().uri("/api/room").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let envelope: Value = serde_json::from_slice(&body).unwrap();
        assert!(!envelope["message"].as_str().unwrap().is_empty());
        assert!(!envelope["error"].as_str().unwrap().is_empty());
    }
}

// Upstream client for the scheduling REST API
// Single attempt per call: no retry, no fallback endpoints.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Duration;

use super::envelope::{parse_envelope, ApiError, Envelope};
use crate::modules::session::SESSION_COOKIE_NAME;
use crate::proxy::config::{BypassHeader, UpstreamProxyConfig};

/// Headers that describe one connection and must not cross the proxy
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// One inbound request destined for the upstream, consumed by `forward`
#[derive(Debug)]
pub struct ProxiedRequest {
    pub method: Method,
    pub inbound_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct UpstreamClient {
    http_client: Client,
    origin: String,
    host: HeaderValue,
    bypass_name: HeaderName,
    bypass_value: HeaderValue,
}

impl UpstreamClient {
    pub fn new(
        origin: &str,
        bypass: &BypassHeader,
        proxy_config: Option<UpstreamProxyConfig>,
    ) -> Result<Self, String> {
        let origin = origin.trim_end_matches('/').to_string();
        let host = host_of(&origin)?;

        let bypass_name = HeaderName::from_bytes(bypass.name.as_bytes())
            .map_err(|e| format!("Invalid bypass header name {:?}: {}", bypass.name, e))?;
        let bypass_value = HeaderValue::from_str(&bypass.value)
            .map_err(|e| format!("Invalid bypass header value: {}", e))?;

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            // Upstream redirects are the browser's business
            .redirect(reqwest::redirect::Policy::none());

        match proxy_config {
            Some(config) if config.enabled && !config.url.is_empty() => {
                let proxy = reqwest::Proxy::all(&config.url)
                    .map_err(|e| format!("Invalid upstream proxy {}: {}", config.url, e))?;
                builder = builder.proxy(proxy);
                tracing::info!("UpstreamClient enabled proxy: {}", config.url);
            }
            _ => {
                builder = builder.no_proxy();
            }
        }

        let http_client = builder
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http_client,
            origin,
            host,
            bypass_name,
            bypass_value,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Build upstream URL: origin + path + verbatim query
    pub fn build_url(origin: &str, path: &str, query: Option<&str>) -> String {
        match query {
            Some(qs) if !qs.is_empty() => format!("{}{}?{}", origin, path, qs),
            _ => format!("{}{}", origin, path),
        }
    }

    /// Headers for a proxied request: inbound copy, upstream host, bypass header, bearer token
    pub fn outbound_headers(&self, inbound: &HeaderMap, bearer_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(inbound.len() + 2);
        for (name, value) in inbound {
            if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
                continue;
            }
            if name == header::COOKIE {
                if let Some(value) = without_session_cookie(value) {
                    headers.append(header::COOKIE, value);
                }
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        headers.insert(header::HOST, self.host.clone());
        headers.insert(self.bypass_name.clone(), self.bypass_value.clone());

        if let Some(token) = bearer_token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(e) => tracing::warn!("session token is not a valid header value: {}", e),
            }
        }

        headers
    }

    /// Forward one request upstream. GET and HEAD never carry a body.
    pub async fn forward(
        &self,
        upstream_path: &str,
        request: ProxiedRequest,
        bearer_token: Option<&str>,
    ) -> Result<Response, reqwest::Error> {
        let url = Self::build_url(&self.origin, upstream_path, request.query.as_deref());
        let headers = self.outbound_headers(&request.headers, bearer_token);

        tracing::debug!(
            "proxy {} {} -> {}",
            request.method,
            request.inbound_path,
            url
        );

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(headers);

        if let Some(body) = outbound_body(&request.method, request.body) {
            builder = builder.body(body);
        }

        builder.send().await
    }

    /// Authorized server-to-server call returning the decoded `payload`
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer_token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = Self::build_url(&self.origin, path, None);

        let mut builder = self
            .http_client
            .request(method.clone(), &url)
            .header(self.bypass_name.clone(), self.bypass_value.clone())
            .header(header::ACCEPT, "application/json");

        if let Some(token) = bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        tracing::debug!("upstream {} {} -> {}", method, path, status);

        match parse_envelope(status, &bytes)? {
            Envelope::Payload(payload) => {
                serde_json::from_value(payload).map_err(|e| ApiError::Decode(e.to_string()))
            }
            Envelope::Failure { status, message } => Err(ApiError::Upstream { status, message }),
        }
    }
}

/// A `cookie` header minus the portal's own session cookie; `None` when nothing is left
fn without_session_cookie(value: &HeaderValue) -> Option<HeaderValue> {
    let Ok(raw) = value.to_str() else {
        return Some(value.clone());
    };

    let kept: Vec<&str> = raw
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next().map(str::trim) != Some(SESSION_COOKIE_NAME))
        .collect();

    if kept.is_empty() {
        return None;
    }
    HeaderValue::from_str(&kept.join("; ")).ok()
}

/// Body to forward for a given method
pub fn outbound_body(method: &Method, body: Bytes) -> Option<Bytes> {
    if method == Method::GET || method == Method::HEAD {
        None
    } else {
        Some(body)
    }
}

/// `host` header value for an origin; the port is kept only when non-default
fn host_of(origin: &str) -> Result<HeaderValue, String> {
    let url = Url::parse(origin).map_err(|e| format!("Invalid upstream origin {}: {}", origin, e))?;
    let host = url
        .host_str()
        .ok_or_else(|| format!("Upstream origin {} has no host", origin))?;
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(|e| format!("Invalid upstream host {}: {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(origin: &str) -> UpstreamClient {
        UpstreamClient::new(origin, &BypassHeader::default(), None).unwrap()
    }

    #[test]
    fn test_build_url() {
        let origin = "https://sched.example.edu";
        assert_eq!(
            UpstreamClient::build_url(origin, "/room/3", None),
            "https://sched.example.edu/room/3"
        );
        assert_eq!(
            UpstreamClient::build_url(origin, "/class", Some("page=2&q=a%20b")),
            "https://sched.example.edu/class?page=2&q=a%20b"
        );
        assert_eq!(
            UpstreamClient::build_url(origin, "/class", Some("")),
            "https://sched.example.edu/class"
        );
    }

    #[test]
    fn test_origin_host_and_trailing_slash() {
        let c = client("https://sched.example.edu/");
        assert_eq!(c.origin(), "https://sched.example.edu");
        assert_eq!(c.host, "sched.example.edu");

        let c = client("http://127.0.0.1:8080");
        assert_eq!(c.host, "127.0.0.1:8080");

        assert!(UpstreamClient::new("not a url", &BypassHeader::default(), None).is_err());
    }

    #[test]
    fn test_outbound_headers() {
        let c = client("https://sched.example.edu");
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("localhost:3000"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert("x-request-id", HeaderValue::from_static("abc"));

        let out = c.outbound_headers(&inbound, Some("tok"));
        assert_eq!(out[header::HOST], "sched.example.edu");
        assert_eq!(out["ngrok-skip-browser-warning"], "true");
        assert_eq!(out[header::AUTHORIZATION], "Bearer tok");
        assert_eq!(out[header::ACCEPT], "application/json");
        assert_eq!(out["x-request-id"], "abc");
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::CONTENT_LENGTH).is_none());

        let out = c.outbound_headers(&inbound, None);
        assert!(out.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_session_cookie_not_forwarded() {
        let c = client("https://sched.example.edu");
        let mut inbound = HeaderMap::new();
        inbound.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}=signed-id; lang=en", SESSION_COOKIE_NAME)).unwrap(),
        );
        let out = c.outbound_headers(&inbound, None);
        assert_eq!(out[header::COOKIE], "theme=dark; lang=en");

        let mut inbound = HeaderMap::new();
        inbound.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}=signed-id", SESSION_COOKIE_NAME)).unwrap(),
        );
        let out = c.outbound_headers(&inbound, Some("tok"));
        assert!(out.get(header::COOKIE).is_none());
        assert_eq!(out[header::AUTHORIZATION], "Bearer tok");
    }

    #[test]
    fn test_body_dropped_for_get_and_head() {
        let body = Bytes::from_static(b"{\"a\":1}");
        assert!(outbound_body(&Method::GET, body.clone()).is_none());
        assert!(outbound_body(&Method::HEAD, body.clone()).is_none());
        assert_eq!(outbound_body(&Method::POST, body.clone()), Some(body.clone()));
        assert_eq!(outbound_body(&Method::DELETE, body.clone()), Some(body));
    }
}

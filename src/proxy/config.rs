use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Portal service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Listening port
    pub port: u16,

    /// Whether to accept connections from the local network
    /// - false: bind 127.0.0.1 only (default)
    /// - true: bind 0.0.0.0
    #[serde(default)]
    pub allow_lan_access: bool,

    /// Origin of the scheduling REST API, e.g. `https://sched.example.edu`
    #[serde(default = "default_upstream_origin")]
    pub upstream_origin: String,

    /// Header the upstream gateway requires on every direct call
    #[serde(default)]
    pub bypass_header: BypassHeader,

    /// Local path prefix whose requests are forwarded upstream
    #[serde(default = "default_reserved_prefix")]
    pub reserved_prefix: String,

    /// Exact inbound paths that map to a fixed upstream path instead of prefix stripping
    #[serde(default = "default_path_overrides")]
    pub path_overrides: HashMap<String, String>,

    /// Base64 key material for signing the session cookie (at least 64 bytes once decoded)
    #[serde(default = "generate_session_secret")]
    pub session_secret: String,

    /// Session validity, extended on every authenticated request
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Interval of the expired-session sweeper (seconds)
    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,

    /// Outbound proxy used to reach the upstream API
    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,
}

/// Outbound proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    pub enabled: bool,
    /// Proxy URL (http://, https://, socks5://)
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BypassHeader {
    pub name: String,
    pub value: String,
}

impl Default for BypassHeader {
    fn default() -> Self {
        Self {
            name: "ngrok-skip-browser-warning".to_string(),
            value: "true".to_string(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            allow_lan_access: false,
            upstream_origin: default_upstream_origin(),
            bypass_header: BypassHeader::default(),
            reserved_prefix: default_reserved_prefix(),
            path_overrides: default_path_overrides(),
            session_secret: generate_session_secret(),
            session_ttl_hours: default_session_ttl_hours(),
            session_sweep_secs: default_session_sweep_secs(),
            upstream_proxy: UpstreamProxyConfig::default(),
        }
    }
}

fn default_upstream_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_reserved_prefix() -> String {
    "/api".to_string()
}

fn default_path_overrides() -> HashMap<String, String> {
    HashMap::from([("/api/profile".to_string(), "/auth/profile".to_string())])
}

const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_session_sweep_secs() -> u64 {
    300
}

/// 64 random bytes, the minimum a signed cookie key accepts
pub fn generate_session_secret() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

impl ProxyConfig {
    /// Actual bind address
    /// - allow_lan_access = false: "127.0.0.1"
    /// - allow_lan_access = true: "0.0.0.0"
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }

    /// Session TTL in hours, rejected outside 1 hour to 1 year
    pub fn session_ttl(&self) -> Result<i64, String> {
        if (1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            Ok(self.session_ttl_hours)
        } else {
            Err(format!(
                "session_ttl_hours must be between 1 and {}, got {}",
                MAX_SESSION_TTL_HOURS, self.session_ttl_hours
            ))
        }
    }

    /// Decode the cookie signing key
    pub fn session_key_bytes(&self) -> Result<Vec<u8>, String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.session_secret.trim())
            .map_err(|e| format!("session_secret is not valid base64: {}", e))?;
        if bytes.len() < 64 {
            return Err(format!(
                "session_secret must decode to at least 64 bytes, got {}",
                bytes.len()
            ));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: ProxyConfig = serde_json::from_str(r#"{"port": 4000}"#).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.reserved_prefix, "/api");
        assert_eq!(
            cfg.path_overrides.get("/api/profile").map(String::as_str),
            Some("/auth/profile")
        );
        assert_eq!(cfg.bypass_header, BypassHeader::default());
        assert!(cfg.session_key_bytes().is_ok());
    }

    #[test]
    fn test_short_session_secret_rejected() {
        let cfg = ProxyConfig {
            session_secret: base64::engine::general_purpose::STANDARD.encode([7u8; 16]),
            ..ProxyConfig::default()
        };
        assert!(cfg.session_key_bytes().unwrap_err().contains("64 bytes"));
    }

    #[test]
    fn test_session_ttl_range() {
        let mut cfg = ProxyConfig::default();
        assert_eq!(cfg.session_ttl(), Ok(24));
        for bad in [0, -5, MAX_SESSION_TTL_HOURS + 1, i64::MAX] {
            cfg.session_ttl_hours = bad;
            assert!(cfg.session_ttl().unwrap_err().contains("session_ttl_hours"));
        }
        cfg.session_ttl_hours = MAX_SESSION_TTL_HOURS;
        assert!(cfg.session_ttl().is_ok());
    }

    #[test]
    fn test_bind_address() {
        let mut cfg = ProxyConfig::default();
        assert_eq!(cfg.get_bind_address(), "127.0.0.1");
        cfg.allow_lan_access = true;
        assert_eq!(cfg.get_bind_address(), "0.0.0.0");
    }
}

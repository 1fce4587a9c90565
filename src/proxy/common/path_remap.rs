// Inbound-to-upstream path mapping for the reverse proxy
use std::collections::HashMap;

/// Static, process-wide path remap table. Built once at startup.
#[derive(Debug, Clone)]
pub struct PathRemap {
    prefix: String,
    overrides: HashMap<String, String>,
}

impl PathRemap {
    pub fn new(prefix: &str, overrides: HashMap<String, String>) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let prefix = if prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
        Self { prefix, overrides }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a path falls under the reserved prefix (segment-aligned)
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Upstream path for an inbound path (the query string is handled separately)
    ///
    /// Priority:
    /// 1. Exact-match override
    /// 2. Reserved prefix stripped exactly once
    pub fn remap(&self, path: &str) -> String {
        if let Some(target) = self.overrides.get(path) {
            return target.clone();
        }

        match path.strip_prefix(self.prefix.as_str()) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }
}

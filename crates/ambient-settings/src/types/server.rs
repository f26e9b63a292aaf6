//! API server and content service settings.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the tenant namespace in [`ContentSettings::url_template`].
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

/// HTTP API server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
    /// URL the runner uses to call back into the API (`BACKEND_API_URL`).
    pub backend_api_url: String,
    /// Seconds to wait for in-flight requests on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
            backend_api_url: "http://ambient-api.ambient-system.svc:8080/api".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

/// Content service: the proxy side (URL template, timeouts) and the server
/// side (root directory, bind address).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentSettings {
    /// Per-tenant endpoint; `{namespace}` is substituted.
    pub url_template: String,
    /// Proxy request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Root directory the content service serves.
    pub root: String,
    /// Content service bind address.
    pub host: String,
    /// Content service bind port.
    pub port: u16,
    /// Largest accepted write in bytes.
    pub max_write_bytes: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            url_template: "http://ambient-content.{namespace}.svc:8080".to_string(),
            request_timeout_ms: 30_000,
            root: "/workspace".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_write_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ContentSettings {
    /// Endpoint for `namespace`.
    pub fn endpoint_for(&self, namespace: &str) -> String {
        self.url_template
            .replace(NAMESPACE_PLACEHOLDER, namespace)
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_substitutes_namespace() {
        let content = ContentSettings {
            url_template: "http://content.{namespace}.svc:8080/".into(),
            ..ContentSettings::default()
        };
        assert_eq!(content.endpoint_for("team-a"), "http://content.team-a.svc:8080");
    }
}

//! Cluster API connection settings.

use serde::{Deserialize, Serialize};

/// How to reach the cluster API and which identity the service runs as.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSettings {
    /// API server base URL.
    pub api_url: String,
    /// File holding the service identity's bearer token.
    pub service_token_path: String,
    /// PEM bundle to trust for the API server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_path: Option<String>,
    /// Skip TLS verification (development clusters only).
    pub insecure_skip_tls_verify: bool,
    /// Request timeout for non-watch calls.
    pub request_timeout_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            api_url: "https://kubernetes.default.svc".to_string(),
            service_token_path: "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
            ca_path: Some("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string()),
            insecure_skip_tls_verify: false,
            request_timeout_ms: 30_000,
        }
    }
}

//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`: partial JSON
//! is accepted and missing fields take their production default.

mod cluster;
mod controller;
mod server;
mod session;

pub use cluster::*;
pub use controller::*;
pub use server::*;
pub use session::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "controller": { "retryLimit": 5 },
///   "content": { "urlTemplate": "http://content.{namespace}.svc:8080" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmbientSettings {
    /// HTTP API server.
    pub server: ServerSettings,
    /// Reconciliation controller.
    pub controller: ControllerSettings,
    /// Session defaults and lifecycle knobs.
    pub session: SessionSettings,
    /// Content service (client and server side).
    pub content: ContentSettings,
    /// Runner credentials and access keys.
    pub credentials: CredentialSettings,
    /// Cluster API connection.
    pub cluster: ClusterSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl AmbientSettings {
    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SettingsError::InvalidValue(msg.to_string()));
        if self.server.port == 0 {
            return fail("server.port must be non-zero");
        }
        if self.content.port == 0 {
            return fail("content.port must be non-zero");
        }
        if self.controller.retry_limit == 0 {
            return fail("controller.retryLimit must be at least 1");
        }
        if self.controller.poll_interval_ms == 0 {
            return fail("controller.pollIntervalMs must be non-zero");
        }
        if self.controller.status_message_limit == 0 {
            return fail("controller.statusMessageLimit must be non-zero");
        }
        if self.session.clone_max_attempts == 0 {
            return fail("session.cloneMaxAttempts must be at least 1");
        }
        if self.session.default_timeout_secs == 0 {
            return fail("session.defaultTimeoutSecs must be non-zero");
        }
        if !self.content.url_template.contains(NAMESPACE_PLACEHOLDER) {
            return fail("content.urlTemplate must contain {namespace}");
        }
        if self.credentials.token_ttl_secs < 600 {
            return fail("credentials.tokenTtlSecs must be at least 600");
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive (`info`, `ambient_controller=debug`, ...).
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

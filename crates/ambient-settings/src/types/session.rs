//! Session defaults and credential settings.

use ambient_core::resources::LlmSettings;
use serde::{Deserialize, Serialize};

/// Defaults applied at creation and knobs for lifecycle operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Model selection when the request has none.
    pub default_llm: LlmSettings,
    /// Timeout when the request has none.
    pub default_timeout_secs: u64,
    /// Name attempts during clone before giving up.
    pub clone_max_attempts: u32,
    /// Fetch-for-update attempts during update.
    pub update_retry_attempts: u32,
    /// Pause between fetch-for-update attempts.
    pub update_retry_delay_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_llm: LlmSettings::default(),
            default_timeout_secs: ambient_core::resources::session::DEFAULT_TIMEOUT_SECS,
            clone_max_attempts: 5,
            update_retry_attempts: 5,
            update_retry_delay_ms: 200,
        }
    }
}

/// Runner tokens and access keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialSettings {
    /// Runner token lifetime.
    pub token_ttl_secs: u64,
    /// Access key token lifetime.
    pub access_key_ttl_secs: u64,
    /// Record the last-used time of access keys on each request.
    pub track_key_usage: bool,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: 24 * 3600,
            access_key_ttl_secs: 365 * 24 * 3600,
            track_key_usage: true,
        }
    }
}

//! Reconciliation controller settings.

use serde::{Deserialize, Serialize};

/// Controller loop, supervision and execution-unit template.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerSettings {
    /// Namespace to watch; `None` watches all namespaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Pause before resubscribing after the watch ends.
    pub watch_backoff_ms: u64,
    /// Supervision poll interval.
    pub poll_interval_ms: u64,
    /// Failed pod attempts before the session is marked `Failed`.
    pub retry_limit: u32,
    /// Minimum execution deadline; a larger session timeout wins.
    pub active_deadline_secs: u64,
    /// Bound on status messages derived from errors and logs.
    pub status_message_limit: usize,
    /// Attempts for a re-read-then-write status update.
    pub status_update_attempts: u32,
    /// Runner container image.
    pub runner_image: String,
    /// Image pull policy.
    pub image_pull_policy: String,
    /// Size limit of the scratch volume.
    pub scratch_size_limit: String,
    /// Default CPU request when the session has no override.
    pub default_cpu: String,
    /// Default memory request when the session has no override.
    pub default_memory: String,
    /// Log lines fetched from a failed pod.
    pub log_tail_lines: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            watch_backoff_ms: 5_000,
            poll_interval_ms: 5_000,
            retry_limit: 3,
            active_deadline_secs: 14_400,
            status_message_limit: 500,
            status_update_attempts: 5,
            runner_image: "quay.io/ambient_code/vteam_claude_runner:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            scratch_size_limit: "2Gi".to_string(),
            default_cpu: "1".to_string(),
            default_memory: "4Gi".to_string(),
            log_tail_lines: 100,
        }
    }
}

//! Package-level constants: API group, label and annotation keys.

/// Current version (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "ambient";

/// API group of the custom resources.
pub const API_GROUP: &str = "vteam.ambient-code";

/// API version of the custom resources.
pub const API_VERSION: &str = "v1alpha1";

// ── Labels ──────────────────────────────────────────────────────────────────

/// Marks a namespace as a managed tenant.
pub const LABEL_MANAGED: &str = "ambient-code.io/managed";

/// Links a session to the workflow named in its `workflowRef`.
pub const LABEL_WORKFLOW: &str = "ambient-code.io/workflow";

/// Links a session to the workflow stage it works on.
pub const LABEL_WORKFLOW_STAGE: &str = "ambient-code.io/workflow-stage";

/// Marks role bindings created through the permission API.
pub const LABEL_PERMISSION: &str = "ambient-code.io/permission";

/// Marks service accounts that back access keys.
pub const LABEL_ACCESS_KEY: &str = "ambient-code.io/access-key";

/// Names the session that owns a runner object.
pub const LABEL_SESSION: &str = "ambient-code.io/session";

/// Standard label the job controller puts on pods.
pub const LABEL_JOB_NAME: &str = "job-name";

// ── Annotations ─────────────────────────────────────────────────────────────

/// Project display name.
pub const ANNOTATION_DISPLAY_NAME: &str = "ambient-code.io/display-name";

/// Project description.
pub const ANNOTATION_DESCRIPTION: &str = "ambient-code.io/description";

/// User who requested the project.
pub const ANNOTATION_REQUESTER: &str = "ambient-code.io/requester";

/// Secret holding the runner token of a session.
pub const ANNOTATION_RUNNER_TOKEN_SECRET: &str = "ambient-code.io/runner-token-secret";

/// Service account of a session's runner.
pub const ANNOTATION_RUNNER_SA: &str = "ambient-code.io/runner-sa";

/// Set by `start` to let the controller reschedule a `Creating` session.
pub const ANNOTATION_RESTART_REQUESTED: &str = "ambient-code.io/restart-requested-at";

/// Access key creation time.
pub const ANNOTATION_CREATED_AT: &str = "ambient-code.io/created-at";

/// Access key last-used time.
pub const ANNOTATION_LAST_USED_AT: &str = "ambient-code.io/last-used-at";

/// Role granted to an access key.
pub const ANNOTATION_ROLE: &str = "ambient-code.io/role";

/// Creator of an access key.
pub const ANNOTATION_CREATED_BY: &str = "ambient-code.io/created-by";

/// Key of the runner token inside its secret.
pub const RUNNER_TOKEN_KEY: &str = "k8s-token";

//! `AgenticSession` custom resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ObjectMeta;
use super::workflow::WorkflowPhase;
use crate::constants::{API_GROUP, API_VERSION};
use crate::errors::ValidationError;
use crate::impl_resource;
use crate::phase::SessionPhase;

/// Default session timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// One unit of agent work.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgenticSession {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: AgenticSessionSpec,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgenticSessionStatus>,
}

impl_resource!(
    AgenticSession,
    group = API_GROUP,
    version = API_VERSION,
    kind = "AgenticSession",
    plural = "agenticsessions",
    status = true
);

impl AgenticSession {
    /// New session with no status.
    pub fn new(metadata: ObjectMeta, spec: AgenticSessionSpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }

    /// Current phase, `Pending` when no status has been written.
    pub fn phase(&self) -> SessionPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Status, created on first access.
    pub fn status_mut(&mut self) -> &mut AgenticSessionStatus {
        self.status.get_or_insert_with(AgenticSessionStatus::default)
    }

    /// Name of the session's display label, falling back to the object name.
    pub fn display_name(&self) -> &str {
        self.spec
            .display_name
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.metadata.name)
    }
}

/// Desired state of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticSessionSpec {
    /// Task text handed to the agent.
    pub prompt: String,
    /// Whether the agent waits for inbox messages instead of exiting.
    #[serde(default)]
    pub interactive: bool,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Model selection.
    #[serde(default)]
    pub llm_settings: LlmSettings,
    /// Wall-clock budget in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Source-control configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_config: Option<GitConfig>,
    /// Compute overrides for the execution unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_overrides: Option<ResourceOverrides>,
    /// Who asked for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<UserContext>,
    /// Bot identity the agent acts as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_account: Option<BotAccountRef>,
    /// Workspace locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<WorkspacePaths>,
    /// Workflow this session works on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_ref: Option<WorkflowRef>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for AgenticSessionSpec {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            interactive: false,
            display_name: None,
            llm_settings: LlmSettings::default(),
            timeout: DEFAULT_TIMEOUT_SECS,
            git_config: None,
            resource_overrides: None,
            user_context: None,
            bot_account: None,
            paths: None,
            workflow_ref: None,
        }
    }
}

impl AgenticSessionSpec {
    /// Check the field-level rules every stored session satisfies.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::missing("prompt"));
        }
        if self.timeout == 0 {
            return Err(ValidationError::invalid("timeout", "must be greater than zero"));
        }
        self.llm_settings.validate()?;
        if let Some(git) = &self.git_config {
            for repo in &git.repositories {
                if repo.url.trim().is_empty() {
                    return Err(ValidationError::missing("gitConfig.repositories[].url"));
                }
            }
        }
        if let Some(workflow) = &self.workflow_ref {
            if workflow.name.trim().is_empty() {
                return Err(ValidationError::missing("workflowRef.name"));
            }
        }
        Ok(())
    }
}

/// Model selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature in `[0, 2]`.
    pub temperature: f64,
    /// Output token cap.
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-7-sonnet-latest".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

impl LlmSettings {
    /// Range checks.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::missing("llmSettings.model"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::invalid(
                "llmSettings.temperature",
                "must be between 0 and 2",
            ));
        }
        if self.max_tokens == 0 {
            return Err(ValidationError::invalid(
                "llmSettings.maxTokens",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Source-control configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    /// Commit identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<GitUser>,
    /// Secret references for authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<GitAuthentication>,
    /// Repositories to clone into the workspace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<GitRepository>,
}

impl GitConfig {
    /// Merge caller configuration over tenant defaults.
    ///
    /// Caller values win field by field; defaults fill the gaps. Repositories
    /// are unioned with the caller's entries first, de-duplicated by URL.
    pub fn merge(caller: Option<Self>, defaults: Option<&Self>) -> Option<Self> {
        let Some(defaults) = defaults else {
            return caller;
        };
        let Some(caller) = caller else {
            return Some(defaults.clone());
        };

        let user = match (caller.user, defaults.user.as_ref()) {
            (Some(c), Some(d)) => Some(GitUser {
                name: c.name.or_else(|| d.name.clone()),
                email: c.email.or_else(|| d.email.clone()),
            }),
            (c, d) => c.or_else(|| d.cloned()),
        };

        let authentication = match (caller.authentication, defaults.authentication.as_ref()) {
            (Some(c), Some(d)) => Some(GitAuthentication {
                ssh_key_secret: c.ssh_key_secret.or_else(|| d.ssh_key_secret.clone()),
                token_secret: c.token_secret.or_else(|| d.token_secret.clone()),
            }),
            (c, d) => c.or_else(|| d.cloned()),
        };

        let mut repositories = caller.repositories;
        for repo in &defaults.repositories {
            if !repositories.iter().any(|r| r.url == repo.url) {
                repositories.push(repo.clone());
            }
        }

        Some(Self {
            user,
            authentication,
            repositories,
        })
    }
}

/// Commit identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitUser {
    /// Author name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Author email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Secret names holding source-control credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAuthentication {
    /// Secret with an `ssh-privatekey` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_secret: Option<String>,
    /// Secret with a `token` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,
}

/// A repository to clone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepository {
    /// Clone URL.
    pub url: String,
    /// Branch to check out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Directory inside the workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_path: Option<String>,
}

/// Compute overrides for the execution unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverrides {
    /// CPU quantity (e.g. `"2"`, `"500m"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory quantity (e.g. `"4Gi"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// Storage class for a persistent scratch volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Scheduling priority class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class: Option<String>,
}

/// Requesting user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    /// Stable user id.
    pub user_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Bot identity reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotAccountRef {
    /// Bot account name.
    pub name: String,
}

/// Workspace locations inside the content root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacePaths {
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Message log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<String>,
    /// Inbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<String>,
}

/// Link from a session to a workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRef {
    /// Workflow name in the same namespace.
    pub name: String,
    /// Stage the session works on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<WorkflowPhase>,
}

/// Observed state of a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticSessionStatus {
    /// Lifecycle phase.
    #[serde(default)]
    pub phase: SessionPhase,
    /// Human-readable detail for the phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the execution unit was scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the session reached a terminal phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Execution unit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// Summary reported by the workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionResult>,
}

/// Summary the workload reports when it finishes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    /// Agent turns taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    /// Spend in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Whether the agent ended in error.
    #[serde(default)]
    pub is_error: bool,
    /// Result subtype reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Final result text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resource;
    use assert_matches::assert_matches;

    fn repo(url: &str) -> GitRepository {
        GitRepository {
            url: url.into(),
            ..GitRepository::default()
        }
    }

    fn spec(prompt: &str) -> AgenticSessionSpec {
        AgenticSessionSpec {
            prompt: prompt.into(),
            ..AgenticSessionSpec::default()
        }
    }

    #[test]
    fn deserializes_minimal_spec_with_defaults() {
        let session: AgenticSession = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "s1", "namespace": "team"},
            "spec": {"prompt": "do it"}
        }))
        .unwrap();
        assert_eq!(session.spec.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(session.spec.llm_settings, LlmSettings::default());
        assert_eq!(session.phase(), SessionPhase::Pending);
    }

    #[test]
    fn status_serializes_camel_case() {
        let mut session = AgenticSession::new(ObjectMeta::named("s1", "team"), spec("x"));
        let status = session.status_mut();
        status.phase = SessionPhase::Running;
        status.job_name = Some("s1-job".into());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"]["phase"], "Running");
        assert_eq!(json["status"]["jobName"], "s1-job");
    }

    #[test]
    fn api_version_and_plural() {
        assert_eq!(AgenticSession::api_version(), "vteam.ambient-code/v1alpha1");
        assert_eq!(AgenticSession::PLURAL, "agenticsessions");
    }

    #[test]
    fn owner_reference_requires_uid() {
        let mut session = AgenticSession::new(ObjectMeta::named("s1", "team"), spec("x"));
        assert!(session.owner_reference().is_none());
        session.metadata.uid = Some("uid-1".into());
        let owner = session.owner_reference().unwrap();
        assert_eq!(owner.kind, "AgenticSession");
        assert_eq!(owner.uid, "uid-1");
        assert!(owner.controller);
    }

    #[test]
    fn validate_rejects_empty_prompt() {
        assert_matches!(spec("  ").validate(), Err(ValidationError::MissingField(f)) if f == "prompt");
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut s = spec("x");
        s.timeout = 0;
        assert_matches!(s.validate(), Err(ValidationError::InvalidValue { field, .. }) if field == "timeout");
    }

    #[test]
    fn validate_rejects_temperature_out_of_range() {
        let mut s = spec("x");
        s.llm_settings.temperature = 2.5;
        assert!(s.validate().is_err());
        s.llm_settings.temperature = 2.0;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn merge_without_defaults_keeps_caller() {
        let caller = GitConfig {
            repositories: vec![repo("https://a")],
            ..GitConfig::default()
        };
        assert_eq!(GitConfig::merge(Some(caller.clone()), None), Some(caller));
        assert_eq!(GitConfig::merge(None, None), None);
    }

    #[test]
    fn merge_caller_wins_defaults_fill() {
        let caller = GitConfig {
            user: Some(GitUser {
                name: Some("caller".into()),
                email: None,
            }),
            authentication: None,
            repositories: vec![repo("https://a"), repo("https://b")],
        };
        let defaults = GitConfig {
            user: Some(GitUser {
                name: Some("default".into()),
                email: Some("bot@example.com".into()),
            }),
            authentication: Some(GitAuthentication {
                ssh_key_secret: None,
                token_secret: Some("git-token".into()),
            }),
            repositories: vec![repo("https://b"), repo("https://c")],
        };
        let merged = GitConfig::merge(Some(caller), Some(&defaults)).unwrap();
        let user = merged.user.unwrap();
        assert_eq!(user.name.as_deref(), Some("caller"));
        assert_eq!(user.email.as_deref(), Some("bot@example.com"));
        assert_eq!(
            merged.authentication.unwrap().token_secret.as_deref(),
            Some("git-token")
        );
        let urls: Vec<_> = merged.repositories.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn merge_defaults_only() {
        let defaults = GitConfig {
            repositories: vec![repo("https://d")],
            ..GitConfig::default()
        };
        assert_eq!(GitConfig::merge(None, Some(&defaults)), Some(defaults));
    }

    #[test]
    fn display_name_falls_back_to_name() {
        let mut session = AgenticSession::new(ObjectMeta::named("s1", "team"), spec("x"));
        assert_eq!(session.display_name(), "s1");
        session.spec.display_name = Some("Nice".into());
        assert_eq!(session.display_name(), "Nice");
    }
}

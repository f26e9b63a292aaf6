//! `Workflow` custom resource and its derived phase.

use serde::{Deserialize, Serialize};

use super::ObjectMeta;
use super::session::GitRepository;
use crate::constants::{API_GROUP, API_VERSION};
use crate::errors::ValidationError;
use crate::impl_resource;

/// Artifact files marking workflow progress, in stage order.
pub const WORKFLOW_ARTIFACTS: [(&str, WorkflowPhase); 3] = [
    ("spec.md", WorkflowPhase::Specify),
    ("plan.md", WorkflowPhase::Plan),
    ("tasks.md", WorkflowPhase::Tasks),
];

/// A multi-stage feature workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Workflow definition.
    pub spec: WorkflowSpec,
}

impl_resource!(
    Workflow,
    group = API_GROUP,
    version = API_VERSION,
    kind = "Workflow",
    plural = "workflows"
);

/// Workflow definition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Title.
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workspace directory under the tenant content root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
    /// Repository holding the specification artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umbrella_repo: Option<GitRepository>,
    /// Additional repositories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_repos: Vec<GitRepository>,
    /// Issue-tracker links per artifact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jira_links: Vec<JiraLink>,
}

impl WorkflowSpec {
    /// Title must be set.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::missing("title"));
        }
        Ok(())
    }

    /// Record or replace the issue link for `path`.
    pub fn upsert_jira_link(&mut self, path: &str, jira_key: &str) {
        match self.jira_links.iter_mut().find(|l| l.path == path) {
            Some(link) => link.jira_key = jira_key.to_string(),
            None => self.jira_links.push(JiraLink {
                path: path.to_string(),
                jira_key: jira_key.to_string(),
            }),
        }
    }
}

/// Artifact path linked to an issue key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraLink {
    /// Artifact path inside the workflow workspace.
    pub path: String,
    /// Issue key.
    pub jira_key: String,
}

/// Derived workflow phase. Also names the stage a session works on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowPhase {
    /// Nothing produced yet.
    #[default]
    Pre,
    /// Writing the specification.
    Specify,
    /// Writing the plan.
    Plan,
    /// Breaking the plan into tasks.
    Tasks,
    /// All artifacts present.
    Completed,
}

impl WorkflowPhase {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Specify => "specify",
            Self::Plan => "plan",
            Self::Tasks => "tasks",
            Self::Completed => "completed",
        }
    }

    /// Compute the phase from the artifact files present at the workspace
    /// root and the stages of currently running linked sessions.
    ///
    /// A running session's stage wins (the latest one if several). Otherwise
    /// all three artifacts mean `Completed`, and a partial set means the
    /// furthest stage with an artifact.
    pub fn derive<S: AsRef<str>>(present: &[S], running_stages: &[WorkflowPhase]) -> Self {
        if let Some(stage) = running_stages.iter().copied().max() {
            return stage;
        }
        let has = |file: &str| present.iter().any(|p| p.as_ref() == file);
        if WORKFLOW_ARTIFACTS.iter().all(|(file, _)| has(file)) {
            return Self::Completed;
        }
        WORKFLOW_ARTIFACTS
            .iter()
            .filter(|(file, _)| has(file))
            .map(|(_, phase)| *phase)
            .max()
            .unwrap_or(Self::Pre)
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

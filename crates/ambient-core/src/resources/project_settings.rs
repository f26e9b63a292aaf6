//! `ProjectSettings` custom resource, one per tenant.

use serde::{Deserialize, Serialize};

use super::ObjectMeta;
use super::session::GitConfig;
use crate::constants::{API_GROUP, API_VERSION};
use crate::impl_resource;

/// Fixed object name of a tenant's settings.
pub const PROJECT_SETTINGS_NAME: &str = "projectsettings";

/// Tenant-wide defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Settings body.
    #[serde(default)]
    pub spec: ProjectSettingsSpec,
}

impl_resource!(
    ProjectSettings,
    group = API_GROUP,
    version = API_VERSION,
    kind = "ProjectSettings",
    plural = "projectsettings"
);

impl ProjectSettings {
    /// Empty settings object for `namespace`.
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            metadata: ObjectMeta::named(PROJECT_SETTINGS_NAME, namespace),
            spec: ProjectSettingsSpec::default(),
        }
    }
}

/// Settings body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettingsSpec {
    /// Secret with runner credentials (`ANTHROPIC_API_KEY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_secrets_name: Option<String>,
    /// Source-control defaults merged into new sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_git_config: Option<GitConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_namespace_uses_fixed_name() {
        let settings = ProjectSettings::for_namespace("team");
        assert_eq!(settings.metadata.name, PROJECT_SETTINGS_NAME);
        assert_eq!(settings.metadata.namespace.as_deref(), Some("team"));
    }

    #[test]
    fn spec_defaults_when_absent() {
        let settings: ProjectSettings = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "projectsettings", "namespace": "team"}
        }))
        .unwrap();
        assert_eq!(settings.spec, ProjectSettingsSpec::default());
    }
}

//! RBAC kinds and policy-rule evaluation.

use ambient_core::naming::project_cluster_role;
use ambient_core::resources::ProjectRole;
use ambient_core::{ObjectMeta, impl_resource};
use serde::{Deserialize, Serialize};

use crate::store::AccessCheck;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// One permission rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// API groups (`"*"` for any).
    #[serde(default)]
    pub api_groups: Vec<String>,
    /// Resources, optionally with `/subresource` (`"*"` for any).
    #[serde(default)]
    pub resources: Vec<String>,
    /// Verbs (`"*"` for any).
    #[serde(default)]
    pub verbs: Vec<String>,
    /// Object names; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
}

impl PolicyRule {
    /// Rule over `resources` in `group` with `verbs`.
    pub fn new(group: &str, resources: &[&str], verbs: &[&str]) -> Self {
        Self {
            api_groups: vec![group.to_string()],
            resources: resources.iter().map(|r| (*r).to_string()).collect(),
            verbs: verbs.iter().map(|v| (*v).to_string()).collect(),
            resource_names: Vec::new(),
        }
    }

    /// Builder: restrict to named objects.
    #[must_use]
    pub fn for_names(mut self, names: &[&str]) -> Self {
        self.resource_names = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Whether this rule grants `check`.
    pub fn allows(&self, check: &AccessCheck) -> bool {
        let any_or = |set: &[String], value: &str| set.iter().any(|s| s == "*" || s == value);
        let resource = check.resource_path();
        any_or(&self.api_groups, &check.group)
            && any_or(&self.verbs, &check.verb)
            && any_or(&self.resources, &resource)
            && (self.resource_names.is_empty()
                || check
                    .name
                    .as_deref()
                    .is_some_and(|n| self.resource_names.iter().any(|r| r == n)))
    }
}

/// Namespaced role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl_resource!(Role, group = RBAC_GROUP, version = "v1", kind = "Role", plural = "roles");

/// Cluster-wide role, bindable in any namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRole {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl_resource!(
    ClusterRole,
    group = RBAC_GROUP,
    version = "v1",
    kind = "ClusterRole",
    plural = "clusterroles",
    namespaced = false
);

/// Grants a role to subjects within one namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Who receives the role.
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Which role.
    pub role_ref: RoleRef,
}

impl_resource!(RoleBinding, group = RBAC_GROUP, version = "v1", kind = "RoleBinding", plural = "rolebindings");

impl RoleBinding {
    /// Whether any subject matches `username` or one of `groups`.
    pub fn binds(&self, username: &str, groups: &[String]) -> bool {
        self.subjects.iter().any(|s| s.matches(username, groups))
    }
}

/// Binding subject.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// `User`, `Group` or `ServiceAccount`.
    pub kind: String,
    /// Subject name.
    pub name: String,
    /// Namespace of a service account subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// API group for users and groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

impl Subject {
    /// User or group subject.
    pub fn principal(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: None,
            api_group: Some(RBAC_GROUP.to_string()),
        }
    }

    /// Service account subject.
    pub fn service_account(namespace: &str, name: &str) -> Self {
        Self {
            kind: "ServiceAccount".to_string(),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            api_group: None,
        }
    }

    /// Whether this subject denotes the given identity.
    pub fn matches(&self, username: &str, groups: &[String]) -> bool {
        match self.kind.as_str() {
            "User" => self.name == username,
            "Group" => groups.iter().any(|g| g == &self.name),
            "ServiceAccount" => self.namespace.as_deref().is_some_and(|ns| {
                username == format!("system:serviceaccount:{ns}:{}", self.name)
            }),
            _ => false,
        }
    }
}

/// Reference to a `Role` or `ClusterRole`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// Always the RBAC group.
    pub api_group: String,
    /// `Role` or `ClusterRole`.
    pub kind: String,
    /// Role name.
    pub name: String,
}

impl RoleRef {
    /// Reference to a namespaced role.
    pub fn role(name: &str) -> Self {
        Self {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: name.to_string(),
        }
    }

    /// Reference to a cluster role.
    pub fn cluster_role(name: &str) -> Self {
        Self {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: name.to_string(),
        }
    }
}

const READ: &[&str] = &["get", "list", "watch"];
const WRITE: &[&str] = &["get", "list", "watch", "create", "update", "patch", "delete"];

const WORKLOAD_RESOURCES: &[&str] = &[
    "agenticsessions",
    "agenticsessions/status",
    "workflows",
    "projectsettings",
];

/// The three project cluster roles (`ambient-project-{admin,edit,view}`).
pub fn project_cluster_roles() -> Vec<ClusterRole> {
    let group = ambient_core::constants::API_GROUP;
    let role = |project_role: ProjectRole, rules: Vec<PolicyRule>| ClusterRole {
        metadata: ObjectMeta::cluster_scoped(project_cluster_role(project_role.as_str()))
            .with_label(ambient_core::constants::LABEL_MANAGED, "true"),
        rules,
    };
    vec![
        role(ProjectRole::Admin, vec![PolicyRule::new("*", &["*"], &["*"])]),
        role(
            ProjectRole::Edit,
            vec![
                PolicyRule::new(group, WORKLOAD_RESOURCES, WRITE),
                PolicyRule::new("batch", &["jobs"], WRITE),
                PolicyRule::new("", &["pods", "pods/log", "serviceaccounts", "secrets"], READ),
                PolicyRule::new(RBAC_GROUP, &["rolebindings", "roles"], READ),
            ],
        ),
        role(
            ProjectRole::View,
            vec![
                PolicyRule::new(group, WORKLOAD_RESOURCES, READ),
                PolicyRule::new("batch", &["jobs"], READ),
                PolicyRule::new("", &["pods", "pods/log"], READ),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(verb: &str, resource: &str, name: Option<&str>) -> AccessCheck {
        AccessCheck {
            namespace: Some("team".into()),
            verb: verb.into(),
            group: ambient_core::constants::API_GROUP.into(),
            resource: resource.into(),
            subresource: None,
            name: name.map(String::from),
        }
    }

    #[test]
    fn wildcard_rule_allows_everything() {
        let rule = PolicyRule::new("*", &["*"], &["*"]);
        assert!(rule.allows(&check("delete", "agenticsessions", None)));
    }

    #[test]
    fn resource_names_restrict() {
        let rule = PolicyRule::new(ambient_core::constants::API_GROUP, &["agenticsessions"], &["get", "update"])
            .for_names(&["s1"]);
        assert!(rule.allows(&check("get", "agenticsessions", Some("s1"))));
        assert!(!rule.allows(&check("get", "agenticsessions", Some("s2"))));
        assert!(!rule.allows(&check("list", "agenticsessions", None)));
        assert!(!rule.allows(&check("delete", "agenticsessions", Some("s1"))));
    }

    #[test]
    fn subresource_must_be_listed() {
        let rule = PolicyRule::new(ambient_core::constants::API_GROUP, &["agenticsessions"], &["update"]);
        let status = check("update", "agenticsessions", None).subresource("status");
        assert!(!rule.allows(&status));
    }

    #[test]
    fn subject_matching() {
        let groups = vec!["team-x".to_string()];
        assert!(Subject::principal("Group", "team-x").matches("bob", &groups));
        assert!(Subject::principal("User", "bob").matches("bob", &[]));
        assert!(
            Subject::service_account("team", "runner")
                .matches("system:serviceaccount:team:runner", &[])
        );
        assert!(!Subject::service_account("other", "runner").matches("system:serviceaccount:team:runner", &[]));
    }

    #[test]
    fn project_roles_shape() {
        let roles = project_cluster_roles();
        let names: Vec<_> = roles.iter().map(|r| r.metadata.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["ambient-project-admin", "ambient-project-edit", "ambient-project-view"]
        );
        let edit = &roles[1];
        let grants = |c: &AccessCheck| edit.rules.iter().any(|r| r.allows(c));
        assert!(grants(&check("create", "agenticsessions", None)));
        let mut rb = check("create", "rolebindings", None);
        rb.group = RBAC_GROUP.into();
        assert!(!grants(&rb));
    }
}

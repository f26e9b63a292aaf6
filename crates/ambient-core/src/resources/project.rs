//! Tenant views: projects, permission assignments and access keys.
//!
//! None of these are stored directly. They are read from and written to
//! namespaces, role bindings and service accounts by `ambient-tenancy`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// A managed tenant namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Namespace name.
    pub name: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Requesting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    /// Namespace creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Namespace phase (`Active`, `Terminating`).
    pub status: String,
}

/// Kind of subject a permission is granted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    /// A single user.
    User,
    /// A group.
    Group,
}

impl SubjectType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }

    /// Kind name in a role binding subject.
    pub fn binding_kind(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
        }
    }

    /// Inverse of [`SubjectType::binding_kind`].
    pub fn from_binding_kind(kind: &str) -> Option<Self> {
        match kind {
            "User" => Some(Self::User),
            "Group" => Some(Self::Group),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            _ => Err(ValidationError::invalid(
                "subjectType",
                format!("unknown subject type '{s}' (expected user or group)"),
            )),
        }
    }
}

/// Role within a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Read-only.
    View,
    /// Read and write, no permission management.
    Edit,
    /// Everything.
    Admin,
}

impl ProjectRole {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Admin => "admin",
        }
    }

    /// Backing cluster role.
    pub fn cluster_role(self) -> String {
        crate::naming::project_cluster_role(self.as_str())
    }

    /// Inverse of [`ProjectRole::cluster_role`].
    pub fn from_cluster_role(name: &str) -> Option<Self> {
        name.strip_prefix("ambient-project-")?.parse().ok()
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "admin" => Ok(Self::Admin),
            _ => Err(ValidationError::invalid(
                "role",
                format!("unknown role '{s}' (expected admin, edit or view)"),
            )),
        }
    }
}

/// A role granted to a user or group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionAssignment {
    /// Subject kind.
    pub subject_type: SubjectType,
    /// Subject name.
    pub subject_name: String,
    /// Granted role.
    pub role: ProjectRole,
}

/// An access key as listed (never includes the token).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    /// Key id (the backing service account name).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Granted role.
    pub role: ProjectRole,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last authenticated use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// A newly created key with its one-time token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccessKey {
    /// Key metadata.
    #[serde(flatten)]
    pub key: AccessKey,
    /// Bearer token, shown once.
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_type_parse() {
        assert_eq!("Group".parse::<SubjectType>().unwrap(), SubjectType::Group);
        assert!("robot".parse::<SubjectType>().is_err());
    }

    #[test]
    fn role_cluster_role_round_trip() {
        for role in [ProjectRole::Admin, ProjectRole::Edit, ProjectRole::View] {
            assert_eq!(ProjectRole::from_cluster_role(&role.cluster_role()), Some(role));
        }
        assert_eq!(ProjectRole::from_cluster_role("cluster-admin"), None);
    }

    #[test]
    fn role_ordering() {
        assert!(ProjectRole::Admin > ProjectRole::Edit);
        assert!(ProjectRole::Edit > ProjectRole::View);
    }

    #[test]
    fn created_key_flattens() {
        let created = CreatedAccessKey {
            key: AccessKey {
                id: "ambient-key-ci-1".into(),
                name: "ci".into(),
                description: None,
                role: ProjectRole::Edit,
                created_at: None,
                last_used_at: None,
                created_by: None,
            },
            token: "tok".into(),
        };
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["id"], "ambient-key-ci-1");
        assert_eq!(json["role"], "edit");
        assert_eq!(json["token"], "tok");
    }
}

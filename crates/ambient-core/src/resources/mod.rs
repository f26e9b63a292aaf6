//! Typed resource schema.
//!
//! Custom resources (`AgenticSession`, `Workflow`, `ProjectSettings`) and the
//! tenant views built on top of namespaces, role bindings and service
//! accounts. Every type here is plain serde; conversion to the generic object
//! representation happens only at the cluster store boundary.

mod meta;
pub mod project;
pub mod project_settings;
pub mod session;
pub mod workflow;

pub use meta::{ObjectMeta, OwnerReference};
pub use project::{AccessKey, CreatedAccessKey, PermissionAssignment, Project, ProjectRole, SubjectType};
pub use project_settings::{PROJECT_SETTINGS_NAME, ProjectSettings, ProjectSettingsSpec};
pub use session::{
    AgenticSession, AgenticSessionSpec, AgenticSessionStatus, BotAccountRef, GitAuthentication,
    GitConfig, GitRepository, GitUser, LlmSettings, ResourceOverrides, SessionResult, UserContext,
    WorkflowRef, WorkspacePaths,
};
pub use workflow::{JiraLink, WORKFLOW_ARTIFACTS, Workflow, WorkflowPhase, WorkflowSpec};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A kind of object stored in the cluster.
///
/// Implemented by the custom resources here and by the built-in kinds in
/// `ambient-cluster`. The constants describe where the kind lives in the
/// REST hierarchy.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// API group (`""` for the core group).
    const GROUP: &'static str;
    /// API version within the group.
    const VERSION: &'static str;
    /// Kind name.
    const KIND: &'static str;
    /// Lowercase plural used in URLs and access reviews.
    const PLURAL: &'static str;
    /// Whether objects live inside a namespace.
    const NAMESPACED: bool = true;
    /// Whether `status` is only writable through the status sub-resource.
    const STATUS_SUBRESOURCE: bool = false;

    /// Object metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Mutable object metadata.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// `group/version`, or just `version` for the core group.
    fn api_version() -> String {
        if Self::GROUP.is_empty() {
            Self::VERSION.to_string()
        } else {
            format!("{}/{}", Self::GROUP, Self::VERSION)
        }
    }

    /// Controller owner reference pointing at this object.
    ///
    /// `None` until the object has been persisted and carries a uid.
    fn owner_reference(&self) -> Option<OwnerReference> {
        let uid = self.meta().uid.clone()?;
        Some(OwnerReference {
            api_version: Self::api_version(),
            kind: Self::KIND.to_string(),
            name: self.meta().name.clone(),
            uid,
            controller: true,
            block_owner_deletion: true,
        })
    }
}

/// Implement [`Resource`] for a struct with a `metadata: ObjectMeta` field.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, group = $group:expr, version = $version:expr, kind = $kind:expr, plural = $plural:expr $(, namespaced = $ns:expr)? $(, status = $status:expr)?) => {
        impl $crate::resources::Resource for $ty {
            const GROUP: &'static str = $group;
            const VERSION: &'static str = $version;
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;
            $(const NAMESPACED: bool = $ns;)?
            $(const STATUS_SUBRESOURCE: bool = $status;)?

            fn meta(&self) -> &$crate::resources::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::resources::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

//! Projects: managed namespaces.
//!
//! Namespaces are cluster-scoped, so reads and writes of the namespace object
//! itself go through the service identity. Visibility is always decided by
//! an access review as the caller: a project the caller cannot see is
//! reported exactly like one that does not exist.

use std::sync::Arc;

use ambient_cluster::objects::{Namespace, RoleBinding, RoleRef, Subject};
use ambient_cluster::{AccessCheck, Api, ListParams, ObjectStore, UserInfo};
use ambient_core::constants::{
    ANNOTATION_DESCRIPTION, ANNOTATION_DISPLAY_NAME, ANNOTATION_REQUESTER, LABEL_MANAGED, LABEL_PERMISSION,
};
use ambient_core::naming::{permission_binding_name, validate_resource_name};
use ambient_core::resources::{AgenticSession, Project, ProjectRole, ProjectSettings, SubjectType};
use ambient_core::ObjectMeta;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::errors::{TenancyError, TenancyResult};

/// Body of a project creation request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    /// Namespace name.
    pub name: String,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of a project update request; absent fields are left unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    /// New display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
}

/// The review that decides whether a caller can see a project.
pub fn visibility_check(namespace: &str) -> AccessCheck {
    AccessCheck::for_kind::<AgenticSession>(namespace, "list")
}

/// The review that decides whether a caller administers a project.
pub fn admin_check(namespace: &str) -> AccessCheck {
    AccessCheck::for_kind::<RoleBinding>(namespace, "create")
}

fn is_managed(namespace: &Namespace) -> bool {
    namespace.metadata.label(LABEL_MANAGED) == Some("true")
}

fn to_project(namespace: &Namespace) -> Project {
    let meta = &namespace.metadata;
    Project {
        name: meta.name.clone(),
        display_name: meta.annotation(ANNOTATION_DISPLAY_NAME).map(String::from),
        description: meta.annotation(ANNOTATION_DESCRIPTION).map(String::from),
        requester: meta.annotation(ANNOTATION_REQUESTER).map(String::from),
        creation_timestamp: meta.creation_timestamp,
        status: namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Active".to_string()),
    }
}

/// Managed namespace `name`, if the caller can see it.
pub async fn ensure_accessible(
    service: Arc<dyn ObjectStore>,
    caller: &dyn ObjectStore,
    name: &str,
) -> TenancyResult<Namespace> {
    let not_found = || TenancyError::NotFound(format!("project '{name}'"));
    let namespace = Api::<Namespace>::all(service)
        .get_opt(name)
        .await?
        .filter(is_managed)
        .ok_or_else(not_found)?;
    if caller.review_access(&visibility_check(name)).await? {
        Ok(namespace)
    } else {
        Err(not_found())
    }
}

/// Managed projects the caller can see.
#[instrument(skip_all)]
pub async fn list(service: Arc<dyn ObjectStore>, caller: &dyn ObjectStore) -> TenancyResult<Vec<Project>> {
    let managed = Api::<Namespace>::all(service)
        .list(&ListParams::default().labels(LABEL_MANAGED, "true"))
        .await?;
    let mut visible = Vec::new();
    for namespace in &managed {
        if caller.review_access(&visibility_check(&namespace.metadata.name)).await? {
            visible.push(to_project(namespace));
        }
    }
    Ok(visible)
}

/// One project.
pub async fn get(service: Arc<dyn ObjectStore>, caller: &dyn ObjectStore, name: &str) -> TenancyResult<Project> {
    Ok(to_project(&ensure_accessible(service, caller, name).await?))
}

/// Create a project: the namespace, its default settings and an admin grant
/// for the requester.
#[instrument(skip_all, fields(project = %request.name, requester = %requester.username))]
pub async fn create(
    service: Arc<dyn ObjectStore>,
    requester: &UserInfo,
    request: CreateProjectRequest,
) -> TenancyResult<Project> {
    validate_resource_name(&request.name)?;
    let mut metadata = ObjectMeta::cluster_scoped(&request.name)
        .with_label(LABEL_MANAGED, "true")
        .with_annotation(ANNOTATION_REQUESTER, &requester.username);
    if let Some(display_name) = request.display_name.as_deref().filter(|d| !d.is_empty()) {
        metadata = metadata.with_annotation(ANNOTATION_DISPLAY_NAME, display_name);
    }
    if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
        metadata = metadata.with_annotation(ANNOTATION_DESCRIPTION, description);
    }
    let namespace = Api::<Namespace>::all(Arc::clone(&service))
        .create(&Namespace { metadata, status: None })
        .await?;
    let name = namespace.metadata.name.clone();

    let _ = Api::<ProjectSettings>::namespaced(Arc::clone(&service), &name)
        .create(&ProjectSettings::for_namespace(&name))
        .await?;

    let (subject, subject_type) = match requester.service_account() {
        Some((ns, account)) => (Subject::service_account(ns, account), "serviceaccount"),
        None => (
            Subject::principal(SubjectType::User.binding_kind(), &requester.username),
            SubjectType::User.as_str(),
        ),
    };
    let binding = RoleBinding {
        metadata: ObjectMeta::named(
            permission_binding_name(ProjectRole::Admin.as_str(), subject_type, &requester.username),
            &name,
        )
        .with_label(LABEL_PERMISSION, "true"),
        subjects: vec![subject],
        role_ref: RoleRef::cluster_role(&ProjectRole::Admin.cluster_role()),
    };
    let _ = Api::<RoleBinding>::namespaced(service, &name).create(&binding).await?;

    info!("project created");
    Ok(to_project(&namespace))
}

/// Update display name and description annotations.
pub async fn update(
    service: Arc<dyn ObjectStore>,
    name: &str,
    request: UpdateProjectRequest,
) -> TenancyResult<Project> {
    let namespaces = Api::<Namespace>::all(service);
    let mut namespace = namespaces
        .get_opt(name)
        .await?
        .filter(is_managed)
        .ok_or_else(|| TenancyError::NotFound(format!("project '{name}'")))?;
    if let Some(display_name) = request.display_name {
        namespace.metadata = namespace.metadata.with_annotation(ANNOTATION_DISPLAY_NAME, display_name);
    }
    if let Some(description) = request.description {
        namespace.metadata = namespace.metadata.with_annotation(ANNOTATION_DESCRIPTION, description);
    }
    Ok(to_project(&namespaces.replace(&namespace).await?))
}

/// Delete a managed project and everything in it.
#[instrument(skip(service))]
pub async fn delete(service: Arc<dyn ObjectStore>, name: &str) -> TenancyResult<()> {
    let namespaces = Api::<Namespace>::all(service);
    if namespaces.get_opt(name).await?.filter(is_managed).is_none() {
        return Err(TenancyError::NotFound(format!("project '{name}'")));
    }
    namespaces.delete(name).await?;
    info!(project = name, "project deleted");
    Ok(())
}

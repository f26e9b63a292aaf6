//! Permission grants as labelled role bindings.

use std::sync::Arc;

use ambient_cluster::objects::{RoleBinding, RoleRef, Subject};
use ambient_cluster::{Api, ListParams, ObjectStore};
use ambient_core::ObjectMeta;
use ambient_core::constants::LABEL_PERMISSION;
use ambient_core::naming::permission_binding_name;
use ambient_core::resources::{PermissionAssignment, ProjectRole, SubjectType};
use ambient_core::ValidationError;
use tracing::{info, instrument};

use crate::errors::{TenancyError, TenancyResult};

fn to_assignments(binding: &RoleBinding) -> impl Iterator<Item = PermissionAssignment> + '_ {
    let role = ProjectRole::from_cluster_role(&binding.role_ref.name);
    binding.subjects.iter().filter_map(move |subject| {
        Some(PermissionAssignment {
            subject_type: SubjectType::from_binding_kind(&subject.kind)?,
            subject_name: subject.name.clone(),
            role: role?,
        })
    })
}

fn permission_bindings(caller: Arc<dyn ObjectStore>, project: &str) -> Api<RoleBinding> {
    Api::namespaced(caller, project)
}

/// All user and group grants in `project`.
pub async fn list(caller: Arc<dyn ObjectStore>, project: &str) -> TenancyResult<Vec<PermissionAssignment>> {
    let bindings = permission_bindings(caller, project)
        .list(&ListParams::default().labels(LABEL_PERMISSION, "true"))
        .await?;
    Ok(bindings.iter().flat_map(to_assignments).collect())
}

/// Grant `assignment.role` to the subject. Granting an existing grant is a no-op.
///
/// Distinct subjects can sanitize to the same binding name; the later one is
/// added to the existing binding's subjects.
#[instrument(skip(caller), fields(subject = %assignment.subject_name, role = %assignment.role))]
pub async fn grant(
    caller: Arc<dyn ObjectStore>,
    project: &str,
    assignment: &PermissionAssignment,
) -> TenancyResult<RoleBinding> {
    if assignment.subject_name.trim().is_empty() {
        return Err(ValidationError::missing("subjectName").into());
    }
    let name = permission_binding_name(
        assignment.role.as_str(),
        assignment.subject_type.as_str(),
        &assignment.subject_name,
    );
    let binding = RoleBinding {
        metadata: ObjectMeta::named(&name, project).with_label(LABEL_PERMISSION, "true"),
        subjects: vec![Subject::principal(
            assignment.subject_type.binding_kind(),
            &assignment.subject_name,
        )],
        role_ref: RoleRef::cluster_role(&assignment.role.cluster_role()),
    };
    let api = permission_bindings(caller, project);
    match api.create(&binding).await {
        Ok(created) => {
            info!(binding = %name, "permission granted");
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            let mut existing = api.get(&name).await?;
            let kind = assignment.subject_type.binding_kind();
            if existing
                .subjects
                .iter()
                .any(|s| s.kind == kind && s.name == assignment.subject_name)
            {
                return Ok(existing);
            }
            existing
                .subjects
                .push(Subject::principal(kind, &assignment.subject_name));
            let updated = api.replace(&existing).await?;
            info!(binding = %name, "permission granted on shared binding");
            Ok(updated)
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove every grant to the subject; fails with `NotFound` when there are none.
#[instrument(skip(caller))]
pub async fn revoke(
    caller: Arc<dyn ObjectStore>,
    project: &str,
    subject_type: SubjectType,
    subject_name: &str,
) -> TenancyResult<usize> {
    let api = permission_bindings(caller, project);
    let bindings = api
        .list(&ListParams::default().labels(LABEL_PERMISSION, "true"))
        .await?;
    let kind = subject_type.binding_kind();
    let is_subject = |s: &Subject| s.kind == kind && s.name == subject_name;
    let mut removed = 0;
    for binding in bindings.into_iter().filter(|b| b.subjects.iter().any(is_subject)) {
        if binding.subjects.iter().all(is_subject) {
            if api.delete_opt(&binding.metadata.name).await? {
                removed += 1;
            }
        } else {
            let mut shared = binding;
            shared.subjects.retain(|s| !is_subject(s));
            let _ = api.replace(&shared).await?;
            removed += 1;
        }
    }
    if removed == 0 {
        return Err(TenancyError::NotFound(format!(
            "permissions for {} '{subject_name}'",
            subject_type.as_str()
        )));
    }
    info!(removed, "permissions revoked");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use ambient_cluster::{AccessCheck, ClusterConnector, InMemoryCluster, UserInfo};
    use assert_matches::assert_matches;

    use super::*;
    use crate::bootstrap::ensure_cluster_roles;
    use crate::projects::{self, CreateProjectRequest};

    async fn setup() -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        ensure_cluster_roles(cluster.service()).await.unwrap();
        cluster.register_user("alice-token", "alice", &[]);
        cluster.register_user("carol-token", "carol", &["team-x"]);
        let alice = UserInfo {
            username: "alice".into(),
            groups: vec![],
        };
        let _ = projects::create(
            cluster.service(),
            &alice,
            CreateProjectRequest {
                name: "team-a".into(),
                ..CreateProjectRequest::default()
            },
        )
        .await
        .unwrap();
        cluster
    }

    fn team_x_edit() -> PermissionAssignment {
        PermissionAssignment {
            subject_type: SubjectType::Group,
            subject_name: "team-x".into(),
            role: ProjectRole::Edit,
        }
    }

    #[tokio::test]
    async fn group_grant_is_deterministic() {
        let cluster = setup().await;
        let admin = cluster.for_token("alice-token");
        let binding = grant(Arc::clone(&admin), "team-a", &team_x_edit()).await.unwrap();
        assert_eq!(binding.metadata.name, "ambient-permission-edit-group-team-x");
        assert_eq!(binding.role_ref.name, "ambient-project-edit");
        assert_eq!(binding.subjects[0].kind, "Group");

        let again = grant(admin, "team-a", &team_x_edit()).await.unwrap();
        assert_eq!(again.metadata.name, binding.metadata.name);

        let carol = cluster.for_token("carol-token");
        let check = AccessCheck::for_kind::<ambient_core::resources::AgenticSession>("team-a", "create");
        assert!(carol.review_access(&check).await.unwrap());
    }

    #[tokio::test]
    async fn list_includes_creator_and_grants() {
        let cluster = setup().await;
        let admin = cluster.for_token("alice-token");
        let _ = grant(Arc::clone(&admin), "team-a", &team_x_edit()).await.unwrap();
        let mut all = list(admin, "team-a").await.unwrap();
        all.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].subject_name, "alice");
        assert_eq!(all[0].role, ProjectRole::Admin);
        assert_eq!(all[1], team_x_edit());
    }

    #[tokio::test]
    async fn revoke_removes_access() {
        let cluster = setup().await;
        let admin = cluster.for_token("alice-token");
        let _ = grant(Arc::clone(&admin), "team-a", &team_x_edit()).await.unwrap();
        let removed = revoke(Arc::clone(&admin), "team-a", SubjectType::Group, "team-x")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let carol = cluster.for_token("carol-token");
        let check = AccessCheck::for_kind::<ambient_core::resources::AgenticSession>("team-a", "list");
        assert!(!carol.review_access(&check).await.unwrap());
        assert_matches!(
            revoke(admin, "team-a", SubjectType::Group, "team-x").await,
            Err(TenancyError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn colliding_subjects_share_a_binding() {
        let cluster = setup().await;
        cluster.register_user("dot-token", "bob.smith", &[]);
        cluster.register_user("dash-token", "bob-smith", &[]);
        let admin = cluster.for_token("alice-token");
        let user = |name: &str| PermissionAssignment {
            subject_type: SubjectType::User,
            subject_name: name.into(),
            role: ProjectRole::Edit,
        };
        let first = grant(Arc::clone(&admin), "team-a", &user("bob.smith")).await.unwrap();
        let second = grant(Arc::clone(&admin), "team-a", &user("bob-smith")).await.unwrap();
        assert_eq!(first.metadata.name, second.metadata.name);
        assert_eq!(second.subjects.len(), 2);

        let create = AccessCheck::for_kind::<ambient_core::resources::AgenticSession>("team-a", "create");
        assert!(cluster.for_token("dot-token").review_access(&create).await.unwrap());
        assert!(cluster.for_token("dash-token").review_access(&create).await.unwrap());

        let removed = revoke(Arc::clone(&admin), "team-a", SubjectType::User, "bob.smith")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!cluster.for_token("dot-token").review_access(&create).await.unwrap());
        assert!(cluster.for_token("dash-token").review_access(&create).await.unwrap());
    }

    #[tokio::test]
    async fn empty_subject_rejected() {
        let cluster = setup().await;
        let mut assignment = team_x_edit();
        assignment.subject_name = " ".into();
        assert_matches!(
            grant(cluster.for_token("alice-token"), "team-a", &assignment).await,
            Err(TenancyError::Validation(_))
        );
    }
}

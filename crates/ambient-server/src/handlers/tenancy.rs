//! Permission grants and access keys inside a project.
//!
//! Both act through the caller's own store, so the cluster's authorization
//! is the final word even after the pre-checks here pass.

use std::sync::Arc;

use ambient_cluster::objects::{RoleBinding, ServiceAccount};
use ambient_core::resources::{AccessKey, CreatedAccessKey, PermissionAssignment, SubjectType};
use ambient_tenancy::access_keys::{self, CreateAccessKeyRequest};
use ambient_tenancy::permissions;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

use super::Items;
use crate::caller::{Caller, authorize_project, check};
use crate::errors::ApiResult;
use crate::state::AppState;

/// Answer of a revoke.
#[derive(Debug, Serialize)]
pub struct Revoked {
    /// Bindings removed.
    pub removed: usize,
}

/// GET /api/projects/{project}/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
) -> ApiResult<Json<Items<PermissionAssignment>>> {
    authorize_project(&state, &caller, &project, &check::<RoleBinding>(&project, "list", None)).await?;
    let grants = permissions::list(Arc::clone(&caller.store), &project).await?;
    Ok(Json(grants.into()))
}

/// POST /api/projects/{project}/permissions
pub async fn grant_permission(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Json(assignment): Json<PermissionAssignment>,
) -> ApiResult<(StatusCode, Json<PermissionAssignment>)> {
    authorize_project(&state, &caller, &project, &check::<RoleBinding>(&project, "create", None)).await?;
    let _ = permissions::grant(Arc::clone(&caller.store), &project, &assignment).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// DELETE /api/projects/{project}/permissions/{subjectType}/{subjectName}
pub async fn revoke_permission(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, subject_type, subject_name)): Path<(String, String, String)>,
) -> ApiResult<Json<Revoked>> {
    authorize_project(&state, &caller, &project, &check::<RoleBinding>(&project, "delete", None)).await?;
    let subject_type: SubjectType = subject_type.parse()?;
    let removed = permissions::revoke(Arc::clone(&caller.store), &project, subject_type, &subject_name).await?;
    Ok(Json(Revoked { removed }))
}

/// GET /api/projects/{project}/keys
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
) -> ApiResult<Json<Items<AccessKey>>> {
    authorize_project(&state, &caller, &project, &check::<ServiceAccount>(&project, "list", None)).await?;
    let keys = access_keys::list(Arc::clone(&caller.store), &project).await?;
    Ok(Json(keys.into()))
}

/// POST /api/projects/{project}/keys
///
/// The token is in this answer only; it cannot be read back later.
pub async fn create_key(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Json(request): Json<CreateAccessKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreatedAccessKey>)> {
    authorize_project(&state, &caller, &project, &check::<ServiceAccount>(&project, "create", None)).await?;
    let creator = caller.store.whoami().await?;
    let created = access_keys::create(
        Arc::clone(&caller.store),
        &project,
        request,
        &creator.username,
        state.settings.credentials.access_key_ttl_secs,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// DELETE /api/projects/{project}/keys/{keyId}
pub async fn delete_key(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, key_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let delete = check::<ServiceAccount>(&project, "delete", Some(&key_id));
    authorize_project(&state, &caller, &project, &delete).await?;
    access_keys::delete(Arc::clone(&caller.store), &project, &key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

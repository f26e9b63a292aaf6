//! Project routes.
//!
//! Namespaces are cluster-scoped, so the namespace itself is read and written
//! by the service identity. Every route first reviews the caller: an invisible
//! project answers 404 and a visible one the caller does not administer
//! answers 403 on update or delete.

use ambient_auth::authorize;
use ambient_core::resources::Project;
use ambient_tenancy::projects::{self, CreateProjectRequest, UpdateProjectRequest, admin_check};
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;

use super::Items;
use crate::caller::Caller;
use crate::errors::ApiResult;
use crate::state::AppState;

async fn require_admin(state: &AppState, caller: &Caller, name: &str) -> ApiResult<()> {
    let _ = projects::ensure_accessible(state.service(), caller.store.as_ref(), name).await?;
    authorize(caller.store.as_ref(), &admin_check(name)).await?;
    Ok(())
}

/// GET /api/projects
pub async fn list(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> ApiResult<Json<Items<Project>>> {
    let visible = projects::list(state.service(), caller.store.as_ref()).await?;
    Ok(Json(visible.into()))
}

/// POST /api/projects
///
/// Self-service: any authenticated caller may create a project and becomes
/// its admin.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let requester = caller.store.whoami().await?;
    let project = projects::create(state.service(), &requester, request).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/{project}
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
) -> ApiResult<Json<Project>> {
    Ok(Json(projects::get(state.service(), caller.store.as_ref(), &project).await?))
}

/// PUT /api/projects/{project}
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    require_admin(&state, &caller, &project).await?;
    Ok(Json(projects::update(state.service(), &project, request).await?))
}

/// DELETE /api/projects/{project}
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&state, &caller, &project).await?;
    projects::delete(state.service(), &project).await?;
    Ok(StatusCode::NO_CONTENT)
}

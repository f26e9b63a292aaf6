//! Per-project settings: one fixed-name object per tenant.

use ambient_core::ObjectMeta;
use ambient_core::resources::{PROJECT_SETTINGS_NAME, ProjectSettings, ProjectSettingsSpec};
use axum::extract::{Extension, Path, State};
use axum::response::Json;
use tracing::{info, instrument};

use crate::caller::{Caller, authorize_project, check};
use crate::errors::ApiResult;
use crate::state::AppState;

/// GET /api/projects/{project}/settings
///
/// Answers with empty defaults when the object was never created.
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
) -> ApiResult<Json<ProjectSettings>> {
    let read = check::<ProjectSettings>(&project, "get", Some(PROJECT_SETTINGS_NAME));
    authorize_project(&state, &caller, &project, &read).await?;
    let settings = caller
        .api::<ProjectSettings>(&project)
        .get_opt(PROJECT_SETTINGS_NAME)
        .await?
        .unwrap_or_else(|| ProjectSettings::for_namespace(&project));
    Ok(Json(settings))
}

/// PUT /api/projects/{project}/settings
#[instrument(skip_all, fields(project = %project))]
pub async fn put(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Json(spec): Json<ProjectSettingsSpec>,
) -> ApiResult<Json<ProjectSettings>> {
    let write = check::<ProjectSettings>(&project, "update", Some(PROJECT_SETTINGS_NAME));
    authorize_project(&state, &caller, &project, &write).await?;
    let api = caller.api::<ProjectSettings>(&project);
    let stored = match api.get_opt(PROJECT_SETTINGS_NAME).await? {
        Some(mut existing) => {
            existing.spec = spec;
            api.replace(&existing).await?
        }
        None => {
            api.create(&ProjectSettings {
                metadata: ObjectMeta::named(PROJECT_SETTINGS_NAME, &project),
                spec,
            })
            .await?
        }
    };
    info!("project settings updated");
    Ok(Json(stored))
}

//! Workflows and their derived phase.
//!
//! The phase is never stored. Every read looks at which artifact files exist
//! at the workspace root and at the stages of running linked sessions.

use ambient_cluster::ListParams;
use ambient_content::path::join_under;
use ambient_content::{normalize_path, workflow_workspace_path};
use ambient_core::constants::LABEL_WORKFLOW;
use ambient_core::naming::{sanitize_name, validate_resource_name};
use ambient_core::resources::{AgenticSession, WORKFLOW_ARTIFACTS, Workflow, WorkflowPhase, WorkflowSpec};
use ambient_core::{ObjectMeta, SessionPhase};
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::Items;
use crate::caller::{Caller, authorize_project, check};
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

/// A workflow with its derived phase.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowView {
    /// The stored workflow.
    #[serde(flatten)]
    pub workflow: Workflow,
    /// Phase computed on read.
    pub phase: WorkflowPhase,
}

/// Body of `POST /workflows`.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    /// Object name; derived from the title when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Workflow definition.
    #[serde(flatten)]
    pub spec: WorkflowSpec,
}

/// Body of `PUT /workflows/{id}/jira`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraLinkRequest {
    /// Artifact path inside the workflow workspace.
    pub path: String,
    /// Issue key.
    pub jira_key: String,
}

/// Normalized workspace root of `workflow`.
pub fn workspace_root(workflow: &Workflow) -> ApiResult<String> {
    Ok(match workflow.spec.workspace_path.as_deref().filter(|p| !p.is_empty()) {
        Some(path) => normalize_path(path)?,
        None => workflow_workspace_path(&workflow.metadata.name, "")?,
    })
}

fn generated_name(title: &str, unix_secs: i64) -> String {
    let base: String = sanitize_name(title).chars().take(40).collect();
    format!("{}-{unix_secs}", base.trim_end_matches('-'))
}

async fn derive_phase(state: &AppState, caller: &Caller, project: &str, workflow: &Workflow) -> ApiResult<WorkflowPhase> {
    let root = workspace_root(workflow)?;
    let mut present = Vec::new();
    for (file, _) in WORKFLOW_ARTIFACTS {
        if state.content.exists(caller.token(), project, &join_under(&root, file)?).await? {
            present.push(file);
        }
    }
    let linked = caller
        .api::<AgenticSession>(project)
        .list(&ListParams::default().labels(LABEL_WORKFLOW, &workflow.metadata.name))
        .await?;
    let running: Vec<WorkflowPhase> = linked
        .iter()
        .filter(|s| s.phase() == SessionPhase::Running)
        .filter_map(|s| s.spec.workflow_ref.as_ref()?.stage)
        .collect();
    Ok(WorkflowPhase::derive(&present, &running))
}

async fn view(state: &AppState, caller: &Caller, project: &str, workflow: Workflow) -> ApiResult<WorkflowView> {
    let phase = derive_phase(state, caller, project, &workflow).await?;
    Ok(WorkflowView { workflow, phase })
}

/// GET /api/projects/{project}/workflows
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
) -> ApiResult<Json<Items<WorkflowView>>> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "list", None)).await?;
    let workflows = caller.api::<Workflow>(&project).list(&ListParams::default()).await?;
    let mut views = Vec::with_capacity(workflows.len());
    for workflow in workflows {
        views.push(view(&state, &caller, &project, workflow).await?);
    }
    Ok(Json(views.into()))
}

/// POST /api/projects/{project}/workflows
#[instrument(skip_all, fields(project = %project))]
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Json(request): Json<CreateWorkflowRequest>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "create", None)).await?;
    request.spec.validate()?;
    let name = match request.name.filter(|n| !n.is_empty()) {
        Some(name) => name,
        None => generated_name(&request.spec.title, Utc::now().timestamp()),
    };
    validate_resource_name(&name)?;
    let mut spec = request.spec;
    if let Some(path) = spec.workspace_path.as_deref() {
        spec.workspace_path = Some(normalize_path(path)?);
    }
    let created = caller
        .api::<Workflow>(&project)
        .create(&Workflow {
            metadata: ObjectMeta::named(&name, &project),
            spec,
        })
        .await?;
    info!(workflow = %name, "workflow created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/projects/{project}/workflows/{id}
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<Json<WorkflowView>> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "get", Some(&id))).await?;
    let workflow = caller.api::<Workflow>(&project).get(&id).await?;
    Ok(Json(view(&state, &caller, &project, workflow).await?))
}

/// DELETE /api/projects/{project}/workflows/{id}
#[instrument(skip_all, fields(project = %project, workflow = %id))]
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "delete", Some(&id))).await?;
    caller.api::<Workflow>(&project).delete(&id).await?;
    info!("workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/projects/{project}/workflows/{id}/sessions
pub async fn sessions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<Json<Items<AgenticSession>>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "list", None)).await?;
    let _ = caller.api::<Workflow>(&project).get(&id).await?;
    let linked = caller
        .api::<AgenticSession>(&project)
        .list(&ListParams::default().labels(LABEL_WORKFLOW, &id))
        .await?;
    Ok(Json(linked.into()))
}

/// PUT /api/projects/{project}/workflows/{id}/jira
#[instrument(skip_all, fields(project = %project, workflow = %id))]
pub async fn link_jira(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id)): Path<(String, String)>,
    Json(request): Json<JiraLinkRequest>,
) -> ApiResult<Json<Workflow>> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "update", Some(&id))).await?;
    if request.jira_key.trim().is_empty() {
        return Err(ApiError::InvalidRequest("jiraKey is required".into()));
    }
    let path = normalize_path(&request.path)?;
    let workflows = caller.api::<Workflow>(&project);
    let mut workflow = workflows.get(&id).await?;
    workflow.spec.upsert_jira_link(&path, request.jira_key.trim());
    let stored = workflows.replace(&workflow).await?;
    info!(path = %path, jira = %request.jira_key, "issue link recorded");
    Ok(Json(stored))
}

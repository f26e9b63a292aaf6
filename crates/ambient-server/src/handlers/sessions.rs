//! Session create, read, update, delete.

use std::time::Duration;

use ambient_cluster::ListParams;
use ambient_controller::update_status;
use ambient_core::constants::{LABEL_WORKFLOW, LABEL_WORKFLOW_STAGE};
use ambient_core::naming::{generated_session_name, validate_resource_name};
use ambient_core::resources::{
    AgenticSession, AgenticSessionSpec, BotAccountRef, GitConfig, LlmSettings, PROJECT_SETTINGS_NAME,
    ProjectSettings, ResourceOverrides, UserContext, Workflow, WorkflowRef, WorkspacePaths,
};
use ambient_core::{ObjectMeta, SessionPhase, ValidationError};
use ambient_content::session_path;
use ambient_settings::SessionSettings;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::Items;
use crate::caller::{Caller, authorize_project, check};
use crate::errors::ApiResult;
use crate::state::AppState;

/// Partial model settings; absent fields take the configured defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettingsPatch {
    /// Model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Output token cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl LlmSettingsPatch {
    /// `base` with this patch's fields applied.
    pub fn apply(self, base: &LlmSettings) -> LlmSettings {
        LlmSettings {
            model: self.model.unwrap_or_else(|| base.model.clone()),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
        }
    }
}

/// Body of `POST /sessions`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Object name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Task text.
    #[serde(default)]
    pub prompt: String,
    /// Interactive mode.
    #[serde(default)]
    pub interactive: bool,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Model settings.
    #[serde(default)]
    pub llm_settings: Option<LlmSettingsPatch>,
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Source-control configuration, merged over the project default.
    #[serde(default)]
    pub git_config: Option<GitConfig>,
    /// Compute overrides.
    #[serde(default)]
    pub resource_overrides: Option<ResourceOverrides>,
    /// Requesting user; taken from forwarded identity when absent.
    #[serde(default)]
    pub user_context: Option<UserContext>,
    /// Bot identity.
    #[serde(default)]
    pub bot_account: Option<BotAccountRef>,
    /// Workspace locations.
    #[serde(default)]
    pub paths: Option<WorkspacePaths>,
    /// Linked workflow.
    #[serde(default)]
    pub workflow_ref: Option<WorkflowRef>,
}

/// Body of `PUT /sessions/{name}`; absent fields are left unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    /// New task text.
    #[serde(default)]
    pub prompt: Option<String>,
    /// New display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Model settings changes.
    #[serde(default)]
    pub llm_settings: Option<LlmSettingsPatch>,
    /// New timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl UpdateSessionRequest {
    fn apply(&self, spec: &mut AgenticSessionSpec) {
        if let Some(prompt) = &self.prompt {
            spec.prompt.clone_from(prompt);
        }
        if let Some(display_name) = &self.display_name {
            spec.display_name = Some(display_name.clone());
        }
        if let Some(llm) = &self.llm_settings {
            spec.llm_settings = llm.clone().apply(&spec.llm_settings);
        }
        if let Some(timeout) = self.timeout {
            spec.timeout = timeout;
        }
    }
}

/// `?workflow=` filter for listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    /// Only sessions linked to this workflow.
    #[serde(default)]
    pub workflow: Option<String>,
}

fn build_spec(request: CreateSessionRequest, defaults: &SessionSettings, caller: &Caller) -> AgenticSessionSpec {
    let user_context = request.user_context.or_else(|| {
        caller.display_user().map(|user| UserContext {
            user_id: user.to_string(),
            display_name: None,
            groups: caller.credential.forwarded_groups.clone(),
        })
    });
    AgenticSessionSpec {
        prompt: request.prompt,
        interactive: request.interactive,
        display_name: request.display_name,
        llm_settings: request
            .llm_settings
            .unwrap_or_default()
            .apply(&defaults.default_llm),
        timeout: request.timeout.unwrap_or(defaults.default_timeout_secs),
        git_config: request.git_config,
        resource_overrides: request.resource_overrides,
        user_context,
        bot_account: request.bot_account,
        paths: request.paths,
        workflow_ref: request.workflow_ref,
    }
}

/// Metadata for a new session: workflow link labels when set.
pub(crate) fn session_metadata(name: &str, project: &str, spec: &AgenticSessionSpec) -> ObjectMeta {
    let mut metadata = ObjectMeta::named(name, project);
    if let Some(workflow) = &spec.workflow_ref {
        metadata = metadata.with_label(LABEL_WORKFLOW, &workflow.name);
        if let Some(stage) = workflow.stage {
            metadata = metadata.with_label(LABEL_WORKFLOW_STAGE, stage.as_str());
        }
    }
    metadata
}

/// Steps after a session object exists: initial status, runner identity,
/// workspace seed. Only the status write can fail the request.
pub(crate) async fn finish_create(state: &AppState, caller: &Caller, session: AgenticSession) -> ApiResult<AgenticSession> {
    let project = session.metadata.namespace_or_empty().to_string();
    let name = session.metadata.name.clone();
    let sessions = caller.api::<AgenticSession>(&project);
    let attempts = state.settings.controller.status_update_attempts;
    let session = update_status(&sessions, &name, attempts, |s| {
        if s.status.is_some() {
            return false;
        }
        s.status_mut().phase = SessionPhase::Pending;
        true
    })
    .await?
    .unwrap_or(session);

    let report = state.provisioner.provision(state.service(), &session).await;
    if !report.is_complete() {
        warn!(session = %name, namespace = %project, failed = report.failed.len(), "runner credentials incomplete");
    }

    match session_path(&name, "messages.json") {
        Ok(path) => {
            if let Err(e) = state.content.write(caller.token(), &project, &path, b"[]").await {
                warn!(session = %name, namespace = %project, error = %e, "workspace seeding failed");
            }
        }
        Err(e) => warn!(session = %name, error = %e, "workspace seeding skipped"),
    }
    Ok(sessions.get_opt(&name).await?.unwrap_or(session))
}

/// GET /api/projects/{project}/sessions
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Items<AgenticSession>>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "list", None)).await?;
    let params = match query.workflow.as_deref().filter(|w| !w.is_empty()) {
        Some(workflow) => ListParams::default().labels(LABEL_WORKFLOW, workflow),
        None => ListParams::default(),
    };
    let sessions = caller.api::<AgenticSession>(&project).list(&params).await?;
    Ok(Json(sessions.into()))
}

/// POST /api/projects/{project}/sessions
#[instrument(skip_all, fields(project = %project))]
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project): Path<String>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<AgenticSession>)> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "create", None)).await?;

    let name = match request.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => {
            validate_resource_name(name)?;
            name.to_string()
        }
        None => generated_session_name(Utc::now().timestamp_millis()),
    };
    let mut spec = build_spec(request, &state.settings.session, &caller);
    spec.validate()?;

    if let Some(workflow) = &spec.workflow_ref {
        if caller.api::<Workflow>(&project).get_opt(&workflow.name).await?.is_none() {
            return Err(ValidationError::invalid(
                "workflowRef.name",
                format!("workflow '{}' does not exist", workflow.name),
            )
            .into());
        }
    }

    let defaults = caller
        .api::<ProjectSettings>(&project)
        .get_opt(PROJECT_SETTINGS_NAME)
        .await?
        .and_then(|s| s.spec.default_git_config);
    spec.git_config = GitConfig::merge(spec.git_config.take(), defaults.as_ref());

    let metadata = session_metadata(&name, &project, &spec);
    let created = caller
        .api::<AgenticSession>(&project)
        .create(&AgenticSession::new(metadata, spec))
        .await?;
    info!(session = %name, "session created");
    let session = finish_create(&state, &caller, created).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/projects/{project}/sessions/{name}
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
) -> ApiResult<Json<AgenticSession>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "get", Some(&name))).await?;
    Ok(Json(caller.api::<AgenticSession>(&project).get(&name).await?))
}

/// PUT /api/projects/{project}/sessions/{name}
///
/// A just-created session may not be readable yet, and a concurrent writer
/// may win the race; both are retried a bounded number of times.
#[instrument(skip_all, fields(project = %project, session = %name))]
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<Json<AgenticSession>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "update", Some(&name))).await?;
    let sessions = caller.api::<AgenticSession>(&project);
    let attempts = state.settings.session.update_retry_attempts.max(1);
    let delay = Duration::from_millis(state.settings.session.update_retry_delay_ms);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match sessions.get(&name).await {
            Ok(mut session) => {
                request.apply(&mut session.spec);
                session.spec.validate()?;
                sessions.replace(&session).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(stored) => return Ok(Json(stored)),
            Err(e) if (e.is_not_found() || e.is_conflict()) && attempt < attempts => {
                debug!(attempt, error = %e, "session update retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// DELETE /api/projects/{project}/sessions/{name}
#[instrument(skip_all, fields(project = %project, session = %name))]
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "delete", Some(&name))).await?;
    caller.api::<AgenticSession>(&project).delete(&name).await?;
    info!("session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use ambient_auth::CallerCredential;
    use ambient_cluster::{ClusterConnector, InMemoryCluster};

    use super::*;

    fn caller(user: Option<&str>) -> Caller {
        Caller {
            credential: CallerCredential {
                token: "t".into(),
                forwarded_user: user.map(String::from),
                forwarded_groups: vec!["team-x".into()],
            },
            store: InMemoryCluster::new().service(),
        }
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let defaults = SessionSettings::default();
        let request = CreateSessionRequest {
            prompt: "fix it".into(),
            llm_settings: Some(LlmSettingsPatch {
                temperature: Some(0.2),
                ..LlmSettingsPatch::default()
            }),
            ..CreateSessionRequest::default()
        };
        let spec = build_spec(request, &defaults, &caller(Some("alice")));
        assert_eq!(spec.timeout, defaults.default_timeout_secs);
        assert_eq!(spec.llm_settings.model, defaults.default_llm.model);
        assert!((spec.llm_settings.temperature - 0.2).abs() < f64::EPSILON);
        let user = spec.user_context.unwrap();
        assert_eq!(user.user_id, "alice");
        assert_eq!(user.groups, vec!["team-x".to_string()]);
    }

    #[test]
    fn no_forwarded_user_means_no_user_context() {
        let request = CreateSessionRequest {
            prompt: "p".into(),
            ..CreateSessionRequest::default()
        };
        let spec = build_spec(request, &SessionSettings::default(), &caller(None));
        assert!(spec.user_context.is_none());
    }

    #[test]
    fn update_leaves_absent_fields() {
        let mut spec = AgenticSessionSpec {
            prompt: "old".into(),
            display_name: Some("Old".into()),
            ..AgenticSessionSpec::default()
        };
        let request = UpdateSessionRequest {
            prompt: Some("new".into()),
            timeout: Some(900),
            ..UpdateSessionRequest::default()
        };
        request.apply(&mut spec);
        assert_eq!(spec.prompt, "new");
        assert_eq!(spec.timeout, 900);
        assert_eq!(spec.display_name.as_deref(), Some("Old"));
    }

    #[test]
    fn workflow_link_becomes_labels() {
        let spec = AgenticSessionSpec {
            prompt: "p".into(),
            workflow_ref: Some(WorkflowRef {
                name: "wf-1".into(),
                stage: Some(ambient_core::resources::WorkflowPhase::Plan),
            }),
            ..AgenticSessionSpec::default()
        };
        let meta = session_metadata("s1", "team", &spec);
        assert_eq!(meta.label(LABEL_WORKFLOW), Some("wf-1"));
        assert_eq!(meta.label(LABEL_WORKFLOW_STAGE), Some("plan"));
    }
}

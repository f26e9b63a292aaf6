//! Lifecycle transitions requested through the API: start, stop, clone and
//! the workload's own status report.
//!
//! Start and stop only write edges [`SessionPhase::can_transition_to`]
//! allows, re-reading the session before every status write.

use ambient_cluster::Api;
use ambient_cluster::objects::Job;
use ambient_controller::{transition, update_status};
use ambient_core::constants::ANNOTATION_RESTART_REQUESTED;
use ambient_core::naming::{MAX_NAME_LEN, job_name, truncate_message, validate_resource_name};
use ambient_core::resources::{AgenticSession, SessionResult};
use ambient_core::SessionPhase;
use ambient_content::session_path;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::sessions::{finish_create, session_metadata};
use crate::caller::{Caller, authorize_project, authorize_scoped, check};
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

const SUFFIX_LEN: usize = 5;

/// Body of `POST /sessions/{name}/clone`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSessionRequest {
    /// Project receiving the copy.
    pub target_project: String,
    /// Name of the copy; the source name when absent.
    #[serde(default)]
    pub new_session_name: Option<String>,
}

/// Body of `PUT /sessions/{name}/status`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Status message.
    #[serde(default)]
    pub message: Option<String>,
    /// Result summary.
    #[serde(flatten)]
    pub result: SessionResult,
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// `base-<suffix>`, cutting `base` so the result stays a valid name.
fn suffixed(base: &str, suffix: &str) -> String {
    let keep = MAX_NAME_LEN - suffix.len() - 1;
    let head: String = base.chars().take(keep).collect();
    format!("{}-{suffix}", head.trim_end_matches('-'))
}

async fn mark_restart(sessions: &Api<AgenticSession>, name: &str, attempts: u32) -> ApiResult<()> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut session = sessions.get(name).await?;
        session.metadata = session
            .metadata
            .with_annotation(ANNOTATION_RESTART_REQUESTED, Utc::now().to_rfc3339());
        match sessions.replace(&session).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!(session = name, attempt, "restart annotation conflicted, re-reading");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn changed_underneath(name: &str) -> ApiError {
    ApiError::Conflict(format!("session '{name}' changed phase during the request"))
}

/// POST /api/projects/{project}/sessions/{name}/start
#[instrument(skip_all, fields(project = %project, session = %name))]
pub async fn start(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
) -> ApiResult<Json<AgenticSession>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "update", Some(&name))).await?;
    let sessions = caller.api::<AgenticSession>(&project);
    let session = sessions.get(&name).await?;
    let phase = session.phase();
    if !phase.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "session '{name}' is {phase}; only finished sessions can be started"
        )));
    }

    // the runner token from the previous run may have expired
    let report = state.provisioner.provision(state.service(), &session).await;
    if !report.is_complete() {
        warn!(failed = report.failed.len(), "runner credentials incomplete on restart");
    }

    if caller.api::<Job>(&project).delete_opt(&job_name(&name)).await? {
        debug!("stale job deleted");
    }
    let attempts = state.settings.controller.status_update_attempts;
    mark_restart(&sessions, &name, attempts).await?;
    let restarted = transition(&sessions, &name, SessionPhase::Creating, attempts, |status| {
        status.message = None;
        status.start_time = None;
        status.completion_time = None;
        status.job_name = None;
        status.result = None;
    })
    .await?
    .ok_or_else(|| changed_underneath(&name))?;
    info!(from = %phase, "session restart requested");
    Ok(Json(restarted))
}

/// POST /api/projects/{project}/sessions/{name}/stop
#[instrument(skip_all, fields(project = %project, session = %name))]
pub async fn stop(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
) -> ApiResult<Json<AgenticSession>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "update", Some(&name))).await?;
    let sessions = caller.api::<AgenticSession>(&project);
    let phase = sessions.get(&name).await?.phase();
    if phase.is_terminal() {
        return Err(ApiError::Conflict(format!("session '{name}' already finished ({phase})")));
    }

    let _ = caller.api::<Job>(&project).delete_opt(&job_name(&name)).await?;
    let attempts = state.settings.controller.status_update_attempts;
    let stopped = transition(&sessions, &name, SessionPhase::Stopped, attempts, |status| {
        status.message = Some("Stopped by user".to_string());
        status.completion_time = Some(Utc::now());
    })
    .await?
    .ok_or_else(|| changed_underneath(&name))?;
    info!(from = %phase, "session stopped");
    Ok(Json(stopped))
}

/// POST /api/projects/{project}/sessions/{name}/clone
///
/// A taken name gets a random suffix, up to the configured attempt count.
#[instrument(skip_all, fields(project = %project, session = %name))]
pub async fn clone(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
    Json(request): Json<CloneSessionRequest>,
) -> ApiResult<(StatusCode, Json<AgenticSession>)> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "get", Some(&name))).await?;
    let source = caller.api::<AgenticSession>(&project).get(&name).await?;

    let target = request.target_project.as_str();
    authorize_project(&state, &caller, target, &check::<AgenticSession>(target, "create", None)).await?;

    let base = request
        .new_session_name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| name.clone());
    validate_resource_name(&base)?;

    let mut spec = source.spec.clone();
    spec.display_name = Some(format!("{} (Duplicate)", source.display_name()));
    if target != project {
        // workflows are per project
        spec.workflow_ref = None;
    }

    let targets = caller.api::<AgenticSession>(target);
    let max_attempts = state.settings.session.clone_max_attempts.max(1);
    for attempt in 0..max_attempts {
        let candidate = if attempt == 0 {
            base.clone()
        } else {
            suffixed(&base, &random_suffix())
        };
        let copy = AgenticSession::new(session_metadata(&candidate, target, &spec), spec.clone());
        match targets.create(&copy).await {
            Ok(created) => {
                info!(target, clone = %candidate, "session cloned");
                let session = finish_create(&state, &caller, created).await?;
                return Ok((StatusCode::CREATED, Json(session)));
            }
            Err(e) if e.is_already_exists() => debug!(candidate = %candidate, "clone name taken"),
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Conflict(format!(
        "no free name for a copy of '{name}' in '{target}' after {max_attempts} attempts"
    )))
}

/// PUT /api/projects/{project}/sessions/{name}/status
///
/// Called by the session's workload with its runner token. Records the
/// summary on the session and the result text as `result.md` in the
/// session's area.
#[instrument(skip_all, fields(project = %project, session = %name))]
pub async fn report_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
    Json(report): Json<StatusReport>,
) -> ApiResult<Json<AgenticSession>> {
    let status_check = check::<AgenticSession>(&project, "update", Some(&name)).subresource("status");
    authorize_scoped(&state, &caller, &project, &status_check).await?;

    let limit = state.settings.controller.status_message_limit;
    let message = report.message.as_deref().map(|m| truncate_message(m, limit));
    let sessions = caller.api::<AgenticSession>(&project);
    let attempts = state.settings.controller.status_update_attempts;
    let updated = update_status(&sessions, &name, attempts, |session| {
        let status = session.status_mut();
        status.result = Some(report.result.clone());
        if let Some(message) = &message {
            status.message = Some(message.clone());
        }
        true
    })
    .await?
    .ok_or_else(|| ApiError::not_found(format!("session '{name}'")))?;

    if let Some(text) = report.result.result.as_deref() {
        let path = session_path(&name, "result.md")?;
        state.content.write(caller.token(), &project, &path, text.as_bytes()).await?;
    }
    info!(is_error = report.result.is_error, "session result recorded");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_lowercase_alphanumeric() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn suffixed_names_stay_valid() {
        assert_eq!(suffixed("s1", "abcde"), "s1-abcde");
        let long = "a".repeat(70);
        let name = suffixed(&long, "abcde");
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(validate_resource_name(&name).is_ok());
    }

    #[test]
    fn status_report_reads_flat_body() {
        let report: StatusReport = serde_json::from_value(serde_json::json!({
            "message": "done",
            "numTurns": 4,
            "totalCostUsd": 0.12,
            "isError": false,
            "result": "All tests pass"
        }))
        .unwrap();
        assert_eq!(report.message.as_deref(), Some("done"));
        assert_eq!(report.result.num_turns, Some(4));
        assert_eq!(report.result.result.as_deref(), Some("All tests pass"));
    }
}

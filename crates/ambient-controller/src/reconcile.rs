//! One reconciliation pass over one session.

use ambient_cluster::Api;
use ambient_cluster::objects::Job;
use ambient_core::SessionPhase;
use ambient_core::constants::ANNOTATION_RESTART_REQUESTED;
use ambient_core::naming::{job_name, truncate_message};
use ambient_core::resources::{AgenticSession, PROJECT_SETTINGS_NAME, ProjectSettings};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::context::ControllerContext;
use crate::errors::ControllerResult;
use crate::job::JobTemplate;
use crate::status::transition;
use crate::supervisor::spawn_supervisor;

/// What a pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The session no longer exists.
    Gone,
    /// Nothing to do in this phase.
    Skipped(SessionPhase),
    /// The session's job already exists.
    JobExists,
    /// A job was created and supervision started.
    Scheduled {
        /// Job name.
        job_name: String,
    },
    /// Job creation failed; the session is in `Error`.
    SchedulingFailed {
        /// Bounded failure message.
        message: String,
    },
    /// A running session without a supervisor got one (controller restart).
    Resumed,
}

/// Whether the session is waiting for a job: new, or restarted through the API.
pub fn needs_job(session: &AgenticSession) -> bool {
    match session.phase() {
        SessionPhase::Pending => true,
        SessionPhase::Creating => session.metadata.annotation(ANNOTATION_RESTART_REQUESTED).is_some(),
        _ => false,
    }
}

/// Bring session `name` one step closer to its desired state.
#[instrument(skip(ctx), fields(namespace = %namespace, session = %name))]
pub async fn reconcile(ctx: &ControllerContext, namespace: &str, name: &str) -> ControllerResult<ReconcileOutcome> {
    let sessions = ctx.sessions(namespace);
    let Some(session) = sessions.get_opt(name).await? else {
        return Ok(ReconcileOutcome::Gone);
    };

    let phase = session.phase();
    if phase == SessionPhase::Running {
        return Ok(if spawn_supervisor(ctx, namespace, name) {
            info!("resumed supervision");
            ReconcileOutcome::Resumed
        } else {
            ReconcileOutcome::Skipped(phase)
        });
    }
    if !needs_job(&session) {
        return Ok(ReconcileOutcome::Skipped(phase));
    }

    let jobs = Api::<Job>::namespaced(ctx.service.clone(), namespace);
    let job_name = job_name(name);
    if jobs.get_opt(&job_name).await?.is_some() {
        debug!(job = %job_name, "job already exists");
        return Ok(ReconcileOutcome::JobExists);
    }

    let attempts = ctx.settings.status_update_attempts;
    let session = if phase == SessionPhase::Creating {
        session
    } else {
        match transition(&sessions, name, SessionPhase::Creating, attempts, |status| {
            status.message = Some("Creating job".to_string());
        })
        .await?
        {
            Some(updated) => updated,
            None => return Ok(ReconcileOutcome::Skipped(phase)),
        }
    };

    let project_settings = Api::<ProjectSettings>::namespaced(ctx.service.clone(), namespace)
        .get_opt(PROJECT_SETTINGS_NAME)
        .await?;
    let template = JobTemplate {
        settings: &ctx.settings,
        backend_api_url: &ctx.backend_api_url,
        project_settings: project_settings.as_ref(),
    };

    let job = template.build(&session)?;
    if let Err(e) = jobs.create(&job).await {
        if e.is_already_exists() {
            debug!(job = %job_name, "job created concurrently");
            return Ok(ReconcileOutcome::JobExists);
        }
        let message = truncate_message(
            &format!("Failed to create job: {e}"),
            ctx.settings.status_message_limit,
        );
        warn!(error = %e, "job creation failed");
        let _ = transition(&sessions, name, SessionPhase::Error, attempts, |status| {
            status.message = Some(message.clone());
            status.completion_time = Some(Utc::now());
        })
        .await?;
        return Ok(ReconcileOutcome::SchedulingFailed { message });
    }

    let started = Utc::now();
    let _ = transition(&sessions, name, SessionPhase::Running, attempts, |status| {
        status.message = Some("Job is running".to_string());
        status.start_time = Some(started);
        status.completion_time = None;
        status.job_name = Some(job_name.clone());
    })
    .await?;
    let _ = spawn_supervisor(ctx, namespace, name);
    info!(job = %job_name, "job scheduled");
    Ok(ReconcileOutcome::Scheduled { job_name })
}

//! Per-session supervision.
//!
//! A supervision task polls the job of one running session until the job
//! succeeds, exhausts its retries or disappears. Each task owns a child of
//! the controller's shutdown token, registered under the session's key, so a
//! deleted session or a controller shutdown stops it at once.

use std::sync::atomic::{AtomicU64, Ordering};

use ambient_cluster::objects::{Job, Pod};
use ambient_cluster::{Api, ListParams};
use ambient_core::SessionPhase;
use ambient_core::constants::LABEL_JOB_NAME;
use ambient_core::naming::{job_name, tail_excerpt};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::context::ControllerContext;
use crate::errors::ControllerResult;
use crate::status::transition;

type SessionKey = (String, String);

struct Supervision {
    id: u64,
    token: CancellationToken,
}

/// Supervision tasks by `(namespace, session)`.
#[derive(Default)]
pub struct SupervisorRegistry {
    tasks: DashMap<SessionKey, Supervision>,
    next_id: AtomicU64,
}

impl SupervisorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, name: &str) -> SessionKey {
        (namespace.to_string(), name.to_string())
    }

    /// Register a task for the session unless one is already running.
    fn register(&self, namespace: &str, name: &str, parent: &CancellationToken) -> Option<(u64, CancellationToken)> {
        match self.tasks.entry(Self::key(namespace, name)) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let token = parent.child_token();
                let _ = slot.insert(Supervision {
                    id,
                    token: token.clone(),
                });
                Some((id, token))
            }
        }
    }

    /// Drop the entry of a finished task, unless a newer task took its place.
    fn release(&self, namespace: &str, name: &str, id: u64) {
        let _ = self
            .tasks
            .remove_if(&Self::key(namespace, name), |_, task| task.id == id);
    }

    /// Whether a task is supervising the session.
    pub fn is_supervised(&self, namespace: &str, name: &str) -> bool {
        self.tasks.contains_key(&Self::key(namespace, name))
    }

    /// Number of running tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is running.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop the session's task. Returns whether one was running.
    pub fn cancel(&self, namespace: &str, name: &str) -> bool {
        match self.tasks.remove(&Self::key(namespace, name)) {
            Some((_, task)) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop every task.
    pub fn cancel_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().token.cancel();
        }
        self.tasks.clear();
    }
}

/// Why a supervision task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisionEnd {
    /// The session reached this terminal phase.
    Finished(SessionPhase),
    /// The session was deleted.
    SessionGone,
    /// The session left `Running` through someone else.
    NotRunning,
    /// The job was deleted.
    JobGone,
    /// The token was cancelled.
    Cancelled,
}

enum Tick {
    Continue,
    End(SupervisionEnd),
}

/// Start supervising the session unless a task already is. Returns whether
/// a task was started.
pub fn spawn_supervisor(ctx: &ControllerContext, namespace: &str, name: &str) -> bool {
    let Some((id, token)) = ctx.supervisors.register(namespace, name, &ctx.shutdown) else {
        return false;
    };
    let ctx = ctx.clone();
    let namespace = namespace.to_string();
    let name = name.to_string();
    let span = info_span!("supervise", namespace = %namespace, session = %name);
    let _ = tokio::spawn(
        async move {
            let end = supervise(&ctx, &namespace, &name, &token).await;
            ctx.supervisors.release(&namespace, &name, id);
            debug!(?end, "supervision ended");
        }
        .instrument(span),
    );
    true
}

/// Poll the session's job until it settles or `token` is cancelled.
pub async fn supervise(
    ctx: &ControllerContext,
    namespace: &str,
    name: &str,
    token: &CancellationToken,
) -> SupervisionEnd {
    let mut interval = tokio::time::interval(ctx.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = token.cancelled() => return SupervisionEnd::Cancelled,
            _ = interval.tick() => {}
        }
        match check(ctx, namespace, name).await {
            Ok(Tick::Continue) => {}
            Ok(Tick::End(end)) => return end,
            Err(e) => warn!(error = %e, transient = e.is_transient(), "supervision check failed"),
        }
    }
}

async fn check(ctx: &ControllerContext, namespace: &str, name: &str) -> ControllerResult<Tick> {
    let sessions = ctx.sessions(namespace);
    let Some(session) = sessions.get_opt(name).await? else {
        return Ok(Tick::End(SupervisionEnd::SessionGone));
    };
    if session.phase() != SessionPhase::Running {
        return Ok(Tick::End(SupervisionEnd::NotRunning));
    }
    let job_name = session
        .status
        .as_ref()
        .and_then(|s| s.job_name.clone())
        .unwrap_or_else(|| job_name(name));
    let jobs = Api::<Job>::namespaced(ctx.service.clone(), namespace);
    let Some(job) = jobs.get_opt(&job_name).await? else {
        return Ok(Tick::End(SupervisionEnd::JobGone));
    };

    let attempts = ctx.settings.status_update_attempts;
    if job.succeeded() > 0 {
        let _ = transition(&sessions, name, SessionPhase::Completed, attempts, |status| {
            status.message = Some("Job completed successfully".to_string());
            status.completion_time = Some(Utc::now());
        })
        .await?;
        info!(job = %job_name, "session completed");
        return Ok(Tick::End(SupervisionEnd::Finished(SessionPhase::Completed)));
    }

    let failed = job.failed();
    if i64::from(failed) >= i64::from(ctx.settings.retry_limit) {
        let message = failure_message(ctx, namespace, &job_name, failed).await;
        let _ = transition(&sessions, name, SessionPhase::Failed, attempts, |status| {
            status.message = Some(message.clone());
            status.completion_time = Some(Utc::now());
        })
        .await?;
        info!(job = %job_name, failed, "session failed");
        return Ok(Tick::End(SupervisionEnd::Finished(SessionPhase::Failed)));
    }
    Ok(Tick::Continue)
}

/// Tail of the newest pod's log, bounded; a generic line when there is none.
async fn failure_message(ctx: &ControllerContext, namespace: &str, job_name: &str, failed: i32) -> String {
    let fallback = format!("Job failed after {failed} attempts");
    let pods = Api::<Pod>::namespaced(ctx.service.clone(), namespace)
        .list(&ListParams::default().labels(LABEL_JOB_NAME, job_name))
        .await;
    let newest = match pods {
        Ok(pods) => pods.into_iter().max_by_key(|p| p.metadata.creation_timestamp),
        Err(e) => {
            debug!(error = %e, "could not list job pods");
            None
        }
    };
    let Some(pod) = newest else {
        return fallback;
    };
    match ctx
        .service
        .pod_logs(namespace, &pod.metadata.name, Some(ctx.settings.log_tail_lines))
        .await
    {
        Ok(log) if !log.trim().is_empty() => tail_excerpt(&log, ctx.settings.status_message_limit),
        Ok(_) => fallback,
        Err(e) => {
            debug!(pod = %pod.metadata.name, error = %e, "could not fetch pod log");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_per_session() {
        let registry = SupervisorRegistry::new();
        let parent = CancellationToken::new();
        let (first, _) = registry.register("team", "s1", &parent).unwrap();
        assert!(registry.register("team", "s1", &parent).is_none());
        assert!(registry.register("team", "s2", &parent).is_some());
        assert_eq!(registry.len(), 2);

        registry.release("team", "s1", first);
        assert!(!registry.is_supervised("team", "s1"));
    }

    #[test]
    fn stale_release_keeps_newer_task() {
        let registry = SupervisorRegistry::new();
        let parent = CancellationToken::new();
        let (old, _) = registry.register("team", "s1", &parent).unwrap();
        assert!(registry.cancel("team", "s1"));
        let (_, token) = registry.register("team", "s1", &parent).unwrap();
        registry.release("team", "s1", old);
        assert!(registry.is_supervised("team", "s1"));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_signals_token() {
        let registry = SupervisorRegistry::new();
        let parent = CancellationToken::new();
        let (_, token) = registry.register("team", "s1", &parent).unwrap();
        assert!(registry.cancel("team", "s1"));
        assert!(token.is_cancelled());
        assert!(!registry.cancel("team", "s1"));
    }

    #[test]
    fn shutdown_reaches_children() {
        let registry = SupervisorRegistry::new();
        let parent = CancellationToken::new();
        let (_, a) = registry.register("team", "s1", &parent).unwrap();
        let (_, b) = registry.register("other", "s1", &parent).unwrap();
        parent.cancel();
        assert!(a.is_cancelled() && b.is_cancelled());
        registry.cancel_all();
        assert!(registry.is_empty());
    }
}

//! Re-read-then-write status updates.
//!
//! Every status write starts from a fresh read, applies its change to that
//! copy and writes it back with the read's `resourceVersion`. A conflict
//! means someone else wrote in between; the cycle is repeated a bounded
//! number of times. Phase changes are only written when the edge is legal
//! from the phase just read.

use ambient_cluster::Api;
use ambient_core::SessionPhase;
use ambient_core::resources::{AgenticSession, AgenticSessionStatus};
use tracing::debug;

use crate::errors::{ControllerError, ControllerResult};

/// Apply `apply` to a fresh copy of session `name` and write its status.
///
/// `apply` returns `false` to abandon the write. Returns the stored session,
/// or `None` when the session is gone or the write was abandoned.
pub async fn update_status<F>(
    sessions: &Api<AgenticSession>,
    name: &str,
    attempts: u32,
    mut apply: F,
) -> ControllerResult<Option<AgenticSession>>
where
    F: FnMut(&mut AgenticSession) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(mut session) = sessions.get_opt(name).await? else {
            return Ok(None);
        };
        if !apply(&mut session) {
            return Ok(None);
        }
        match sessions.replace_status(&session).await {
            Ok(stored) => return Ok(Some(stored)),
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!(session = name, attempt, "status write conflicted, re-reading");
            }
            Err(e) if e.is_conflict() => {
                return Err(ControllerError::StatusConflict {
                    name: name.to_string(),
                    attempts,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Move session `name` to `next`, then let `apply` fill in the rest of the
/// status. Skipped (returns `None`) when the edge is illegal from the
/// current phase.
pub async fn transition<F>(
    sessions: &Api<AgenticSession>,
    name: &str,
    next: SessionPhase,
    attempts: u32,
    mut apply: F,
) -> ControllerResult<Option<AgenticSession>>
where
    F: FnMut(&mut AgenticSessionStatus),
{
    update_status(sessions, name, attempts, |session| {
        let current = session.phase();
        if !current.can_transition_to(next) {
            debug!(session = name, from = %current, to = %next, "transition not allowed");
            return false;
        }
        let status = session.status_mut();
        status.phase = next;
        apply(status);
        true
    })
    .await
}

#[cfg(test)]
mod tests {
    use ambient_cluster::objects::Namespace;
    use ambient_cluster::{ClusterConnector, InMemoryCluster};
    use ambient_core::ObjectMeta;
    use ambient_core::resources::AgenticSessionSpec;
    use chrono::Utc;

    use super::*;

    async fn sessions_with(phase: Option<SessionPhase>) -> Api<AgenticSession> {
        let cluster = InMemoryCluster::new();
        let _ = Api::<Namespace>::all(cluster.service())
            .create(&Namespace {
                metadata: ObjectMeta::cluster_scoped("team"),
                status: None,
            })
            .await
            .unwrap();
        let sessions = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        let created = sessions
            .create(&AgenticSession::new(
                ObjectMeta::named("s1", "team"),
                AgenticSessionSpec {
                    prompt: "go".into(),
                    ..AgenticSessionSpec::default()
                },
            ))
            .await
            .unwrap();
        if let Some(phase) = phase {
            let mut with_status = created;
            with_status.status_mut().phase = phase;
            let _ = sessions.replace_status(&with_status).await.unwrap();
        }
        sessions
    }

    #[tokio::test]
    async fn legal_transition_is_written() {
        let sessions = sessions_with(None).await;
        let now = Utc::now();
        let updated = transition(&sessions, "s1", SessionPhase::Creating, 3, |s| {
            s.start_time = Some(now);
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.phase(), SessionPhase::Creating);
        assert_eq!(updated.status.unwrap().start_time, Some(now));
    }

    #[tokio::test]
    async fn illegal_transition_is_skipped() {
        let sessions = sessions_with(Some(SessionPhase::Completed)).await;
        let result = transition(&sessions, "s1", SessionPhase::Stopped, 3, |_| {}).await.unwrap();
        assert!(result.is_none());
        assert_eq!(sessions.get("s1").await.unwrap().phase(), SessionPhase::Completed);
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let sessions = sessions_with(None).await;
        let result = transition(&sessions, "ghost", SessionPhase::Creating, 3, |_| {})
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn conflict_is_retried_from_fresh_read() {
        let sessions = sessions_with(None).await;
        let mut calls = 0;
        let updated = update_status(&sessions, "s1", 3, |session| {
            calls += 1;
            if calls == 1 {
                // as if another writer got in after this read
                session.metadata.resource_version = Some("0".into());
            }
            session.status_mut().phase = SessionPhase::Creating;
            true
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(updated.phase(), SessionPhase::Creating);
    }

    #[tokio::test]
    async fn persistent_conflict_gives_up() {
        let sessions = sessions_with(None).await;
        let result = update_status(&sessions, "s1", 2, |session| {
            session.metadata.resource_version = Some("0".into());
            true
        })
        .await;
        assert!(matches!(
            result,
            Err(ControllerError::StatusConflict { attempts: 2, .. })
        ));
    }
}

//! Credential Provisioner.
//!
//! Gives each session's workload its own identity with the narrowest grant
//! it needs: read and update its own session object and status, nothing else.
//! All objects are created with the service identity and owned by the
//! session, so deleting the session revokes them.
//!
//! Provisioning is best-effort. Every step that fails is logged and recorded
//! in the [`ProvisionReport`]; the caller decides what to do with a partial
//! result.

use std::fmt;
use std::sync::Arc;

use ambient_cluster::objects::{PolicyRule, Role, RoleBinding, RoleRef, Secret, ServiceAccount, Subject};
use ambient_cluster::{Api, ClusterResult, ObjectStore};
use ambient_core::constants::{
    ANNOTATION_RUNNER_SA, ANNOTATION_RUNNER_TOKEN_SECRET, API_GROUP, LABEL_SESSION, RUNNER_TOKEN_KEY,
};
use ambient_core::naming::{runner_identity_name, runner_token_secret_name};
use ambient_core::resources::AgenticSession;
use ambient_core::{ObjectMeta, Resource};
use tracing::{info, instrument, warn};

const ANNOTATE_ATTEMPTS: usize = 3;

/// One provisioning step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStep {
    /// Service account `ambient-session-<S>`.
    ServiceAccount,
    /// Role scoped to the session object.
    Role,
    /// Binding of the account to the role.
    RoleBinding,
    /// Bound token stored in `ambient-runner-token-<S>`.
    TokenSecret,
    /// Session annotations pointing at the account and secret.
    Annotations,
}

impl ProvisionStep {
    /// All steps in execution order.
    pub const ALL: [Self; 5] = [
        Self::ServiceAccount,
        Self::Role,
        Self::RoleBinding,
        Self::TokenSecret,
        Self::Annotations,
    ];
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServiceAccount => "service-account",
            Self::Role => "role",
            Self::RoleBinding => "role-binding",
            Self::TokenSecret => "token-secret",
            Self::Annotations => "annotations",
        })
    }
}

/// Outcome of [`CredentialProvisioner::provision`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Steps that succeeded (or found their object already present).
    pub completed: Vec<ProvisionStep>,
    /// Steps that failed, with the error text.
    pub failed: Vec<(ProvisionStep, String)>,
}

impl ProvisionReport {
    /// Whether every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.completed.len() == ProvisionStep::ALL.len()
    }

    fn record(&mut self, step: ProvisionStep, result: ClusterResult<()>) -> bool {
        match result {
            Ok(()) => {
                self.completed.push(step);
                true
            }
            Err(e) => {
                warn!(step = %step, error = %e, "credential provisioning step failed");
                self.failed.push((step, e.to_string()));
                false
            }
        }
    }
}

/// Creates the per-session runner identity.
#[derive(Clone, Debug)]
pub struct CredentialProvisioner {
    token_ttl_secs: u64,
}

impl CredentialProvisioner {
    /// Provisioner minting tokens valid for `token_ttl_secs`.
    pub fn new(token_ttl_secs: u64) -> Self {
        Self { token_ttl_secs }
    }

    /// The two rules granted to a session's workload.
    pub fn session_rules(session: &str) -> Vec<PolicyRule> {
        let verbs = ["get", "update", "patch"];
        vec![
            PolicyRule::new(API_GROUP, &[AgenticSession::PLURAL], &verbs).for_names(&[session]),
            PolicyRule::new(API_GROUP, &["agenticsessions/status"], &verbs).for_names(&[session]),
        ]
    }

    /// Provision the runner identity for `session` using `service`.
    #[instrument(skip_all, fields(session = %session.metadata.name, namespace = %session.metadata.namespace_or_empty()))]
    pub async fn provision(&self, service: Arc<dyn ObjectStore>, session: &AgenticSession) -> ProvisionReport {
        let name = session.metadata.name.as_str();
        let namespace = session.metadata.namespace_or_empty();
        let identity = runner_identity_name(name);
        let secret_name = runner_token_secret_name(name);
        let meta = |object_name: &str| {
            ObjectMeta::named(object_name, namespace)
                .with_label(LABEL_SESSION, name)
                .owned_by(session.owner_reference())
        };
        let mut report = ProvisionReport::default();

        let accounts = Api::<ServiceAccount>::namespaced(Arc::clone(&service), namespace);
        let account = ServiceAccount {
            metadata: meta(&identity),
        };
        let account_ok = report.record(ProvisionStep::ServiceAccount, create_or_keep(&accounts, &account).await);

        let roles = Api::<Role>::namespaced(Arc::clone(&service), namespace);
        let role = Role {
            metadata: meta(&identity),
            rules: Self::session_rules(name),
        };
        let _ = report.record(ProvisionStep::Role, create_or_keep(&roles, &role).await);

        let bindings = Api::<RoleBinding>::namespaced(Arc::clone(&service), namespace);
        let binding = RoleBinding {
            metadata: meta(&identity),
            subjects: vec![Subject::service_account(namespace, &identity)],
            role_ref: RoleRef::role(&identity),
        };
        let _ = report.record(ProvisionStep::RoleBinding, create_or_keep(&bindings, &binding).await);

        let token_result = if account_ok {
            self.store_token(&service, namespace, &identity, &secret_name, meta(&secret_name))
                .await
        } else {
            Err(ambient_cluster::ClusterError::not_found("serviceaccounts", &identity))
        };
        let _ = report.record(ProvisionStep::TokenSecret, token_result);

        let sessions = Api::<AgenticSession>::namespaced(service, namespace);
        let _ = report.record(
            ProvisionStep::Annotations,
            annotate(&sessions, name, &identity, &secret_name).await,
        );

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "runner credentials provisioned"
        );
        report
    }

    async fn store_token(
        &self,
        service: &Arc<dyn ObjectStore>,
        namespace: &str,
        account: &str,
        secret_name: &str,
        metadata: ObjectMeta,
    ) -> ClusterResult<()> {
        let token = service.request_token(namespace, account, self.token_ttl_secs).await?;
        let secrets = Api::<Secret>::namespaced(Arc::clone(service), namespace);
        let secret = Secret::opaque(metadata, RUNNER_TOKEN_KEY, &token);
        match secrets.create(&secret).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                // restart of an existing session: refresh the token in place
                let mut existing = secrets.get(secret_name).await?;
                existing.data = secret.data;
                let _ = secrets.replace(&existing).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn create_or_keep<K: Resource>(api: &Api<K>, object: &K) -> ClusterResult<()> {
    match api.create(object).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}

async fn annotate(
    sessions: &Api<AgenticSession>,
    name: &str,
    account: &str,
    secret_name: &str,
) -> ClusterResult<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut session = sessions.get(name).await?;
        session.metadata = session
            .metadata
            .with_annotation(ANNOTATION_RUNNER_SA, account)
            .with_annotation(ANNOTATION_RUNNER_TOKEN_SECRET, secret_name);
        match sessions.replace(&session).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_conflict() && attempt < ANNOTATE_ATTEMPTS => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use ambient_cluster::objects::Namespace;
    use ambient_cluster::{ClusterConnector, ClusterError, InMemoryCluster};
    use ambient_core::resources::AgenticSessionSpec;
    use assert_matches::assert_matches;

    use super::*;

    async fn cluster_with_session() -> (InMemoryCluster, AgenticSession) {
        let cluster = InMemoryCluster::new();
        Api::<Namespace>::all(cluster.service())
            .create(&Namespace {
                metadata: ObjectMeta::cluster_scoped("team"),
                status: None,
            })
            .await
            .unwrap();
        let sessions = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        for name in ["s1", "s2"] {
            sessions
                .create(&AgenticSession::new(
                    ObjectMeta::named(name, "team"),
                    AgenticSessionSpec {
                        prompt: "go".into(),
                        ..AgenticSessionSpec::default()
                    },
                ))
                .await
                .unwrap();
        }
        let s1 = sessions.get("s1").await.unwrap();
        (cluster, s1)
    }

    #[tokio::test]
    async fn provisions_every_step() {
        let (cluster, session) = cluster_with_session().await;
        let report = CredentialProvisioner::new(3600).provision(cluster.service(), &session).await;
        assert!(report.is_complete(), "{report:?}");

        let role = Api::<Role>::namespaced(cluster.service(), "team")
            .get("ambient-session-s1")
            .await
            .unwrap();
        assert_eq!(role.rules.len(), 2);
        assert!(role.rules.iter().all(|r| r.resource_names == vec!["s1".to_string()]));
        assert_eq!(role.metadata.owner_references[0].name, "s1");

        let annotated = Api::<AgenticSession>::namespaced(cluster.service(), "team")
            .get("s1")
            .await
            .unwrap();
        assert_eq!(
            annotated.metadata.annotation(ANNOTATION_RUNNER_TOKEN_SECRET),
            Some("ambient-runner-token-s1")
        );
        assert_eq!(annotated.metadata.annotation(ANNOTATION_RUNNER_SA), Some("ambient-session-s1"));
    }

    #[tokio::test]
    async fn minted_token_reaches_only_its_session() {
        let (cluster, session) = cluster_with_session().await;
        let _ = CredentialProvisioner::new(3600).provision(cluster.service(), &session).await;
        let secret = Api::<Secret>::namespaced(cluster.service(), "team")
            .get("ambient-runner-token-s1")
            .await
            .unwrap();
        let token = secret.value(RUNNER_TOKEN_KEY).unwrap();

        let runner = Api::<AgenticSession>::namespaced(cluster.for_token(&token), "team");
        let mut own = runner.get("s1").await.unwrap();
        own.status_mut().message = Some("working".into());
        runner.replace_status(&own).await.unwrap();
        assert_matches!(runner.get("s2").await, Err(ClusterError::Forbidden { .. }));
        assert_matches!(runner.delete("s1").await, Err(ClusterError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let (cluster, session) = cluster_with_session().await;
        let provisioner = CredentialProvisioner::new(3600);
        let _ = provisioner.provision(cluster.service(), &session).await;
        let again = provisioner.provision(cluster.service(), &session).await;
        assert!(again.is_complete(), "{again:?}");
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let (cluster, mut session) = cluster_with_session().await;
        session.metadata.namespace = Some("gone".into());
        let report = CredentialProvisioner::new(3600).provision(cluster.service(), &session).await;
        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), ProvisionStep::ALL.len());
    }

    #[tokio::test]
    async fn session_deletion_revokes_identity() {
        let (cluster, session) = cluster_with_session().await;
        let _ = CredentialProvisioner::new(3600).provision(cluster.service(), &session).await;
        Api::<AgenticSession>::namespaced(cluster.service(), "team")
            .delete("s1")
            .await
            .unwrap();
        for kind in [
            ambient_cluster::ResourceKind::of::<ServiceAccount>(),
            ambient_cluster::ResourceKind::of::<Role>(),
            ambient_cluster::ResourceKind::of::<RoleBinding>(),
            ambient_cluster::ResourceKind::of::<Secret>(),
        ] {
            assert_eq!(cluster.count(&kind, "team"), 0, "{kind} left behind");
        }
    }
}

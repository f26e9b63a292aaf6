//! In-process cluster.
//!
//! Implements the same contract as the REST adapter: optimistic concurrency
//! on `resourceVersion`, owner-reference cascade on delete, namespace
//! deletion removing its contents, watch streams that replay existing objects
//! as `ADDED`, bound service-account tokens, and authorization from stored
//! `RoleBinding`s. Used by the test suites and by `ambient api --in-memory`
//! for local development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use jsonwebtoken::{EncodingKey, Header};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use crate::errors::{ClusterError, ClusterResult};
use crate::objects::{ClusterRole, Namespace, Pod, Role, RoleBinding, ServiceAccount};
use crate::store::{
    AccessCheck, ClusterConnector, ListParams, ObjectStore, RawWatchEvent, RawWatchStream,
    ResourceKind, UserInfo, WatchEventType,
};

/// Username of the service identity.
pub const SERVICE_USERNAME: &str = "system:serviceaccount:ambient-system:ambient-operator";

const EVENT_BUFFER: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    resource: String,
    namespace: String,
    name: String,
}

#[derive(Clone, Debug)]
struct StoredEvent {
    resource: String,
    namespace: String,
    event: RawWatchEvent,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    logs: HashMap<(String, String), String>,
    revision: u64,
}

struct Inner {
    state: RwLock<State>,
    tokens: RwLock<HashMap<String, UserInfo>>,
    events: broadcast::Sender<StoredEvent>,
    signing_key: EncodingKey,
}

/// Shared in-memory cluster. Cloning yields another handle to the same data.
#[derive(Clone)]
pub struct InMemoryCluster {
    inner: Arc<Inner>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// Empty cluster with no namespaces.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let secret = uuid::Uuid::now_v7();
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                tokens: RwLock::new(HashMap::new()),
                events,
                signing_key: EncodingKey::from_secret(secret.as_bytes()),
            }),
        }
    }

    /// Accept `token` as the given user.
    pub fn register_user(&self, token: &str, username: &str, groups: &[&str]) {
        let mut all_groups: Vec<String> = groups.iter().map(|g| (*g).to_string()).collect();
        all_groups.push("system:authenticated".to_string());
        let _ = self.inner.tokens.write().insert(
            token.to_string(),
            UserInfo {
                username: username.to_string(),
                groups: all_groups,
            },
        );
    }

    /// Set the log text returned for a pod.
    pub fn set_pod_logs(&self, namespace: &str, pod: &str, logs: &str) {
        let _ = self
            .inner
            .state
            .write()
            .logs
            .insert((namespace.to_string(), pod.to_string()), logs.to_string());
    }

    /// Number of stored objects of `kind` in `namespace`.
    pub fn count(&self, kind: &ResourceKind, namespace: &str) -> usize {
        let resource = resource_key(kind);
        self.inner
            .state
            .read()
            .objects
            .keys()
            .filter(|k| k.resource == resource && k.namespace == namespace)
            .count()
    }

    fn client(&self, identity: Identity) -> Arc<dyn ObjectStore> {
        Arc::new(MemoryClient {
            inner: Arc::clone(&self.inner),
            identity,
        })
    }
}

impl ClusterConnector for InMemoryCluster {
    fn service(&self) -> Arc<dyn ObjectStore> {
        self.client(Identity::Service)
    }

    fn for_token(&self, token: &str) -> Arc<dyn ObjectStore> {
        self.client(Identity::Token(token.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Identity {
    Service,
    Token(String),
}

enum Resolved {
    Service,
    User(UserInfo),
}

struct MemoryClient {
    inner: Arc<Inner>,
    identity: Identity,
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    sub: &'a str,
    iss: &'a str,
    iat: i64,
    exp: i64,
}

impl MemoryClient {
    fn resolve(&self) -> ClusterResult<Resolved> {
        let token = match &self.identity {
            Identity::Service => return Ok(Resolved::Service),
            Identity::Token(token) => token,
        };
        let user = self
            .inner
            .tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| ClusterError::Unauthorized {
                message: "invalid bearer token".into(),
            })?;
        // bound tokens die with their service account
        if let Some((ns, name)) = user.service_account() {
            let key = ObjectKey {
                resource: resource_key(&ResourceKind::of::<ServiceAccount>()),
                namespace: ns.to_string(),
                name: name.to_string(),
            };
            if !self.inner.state.read().objects.contains_key(&key) {
                return Err(ClusterError::Unauthorized {
                    message: "token service account no longer exists".into(),
                });
            }
        }
        Ok(Resolved::User(user))
    }

    fn authorize(&self, check: &AccessCheck) -> ClusterResult<()> {
        match self.resolve()? {
            Resolved::Service => Ok(()),
            Resolved::User(user) => {
                if self.allowed(&user, check) {
                    Ok(())
                } else {
                    Err(ClusterError::Forbidden {
                        message: format!(
                            "user \"{}\" cannot {} resource \"{}\" in namespace \"{}\"",
                            user.username,
                            check.verb,
                            check.resource_path(),
                            check.namespace.as_deref().unwrap_or_default()
                        ),
                    })
                }
            }
        }
    }

    fn allowed(&self, user: &UserInfo, check: &AccessCheck) -> bool {
        let Some(namespace) = check.namespace.as_deref() else {
            return false;
        };
        let state = self.inner.state.read();
        let binding_resource = resource_key(&ResourceKind::of::<RoleBinding>());
        let bindings = state
            .objects
            .iter()
            .filter(|(k, _)| k.resource == binding_resource && k.namespace == namespace)
            .filter_map(|(_, v)| serde_json::from_value::<RoleBinding>(v.clone()).ok())
            .filter(|b| b.binds(&user.username, &user.groups));

        for binding in bindings {
            let (resource, ns) = if binding.role_ref.kind == "ClusterRole" {
                (resource_key(&ResourceKind::of::<ClusterRole>()), String::new())
            } else {
                (resource_key(&ResourceKind::of::<Role>()), namespace.to_string())
            };
            let key = ObjectKey {
                resource,
                namespace: ns,
                name: binding.role_ref.name.clone(),
            };
            let Some(role) = state.objects.get(&key) else {
                continue;
            };
            let rules = serde_json::from_value::<Role>(role.clone())
                .map(|r| r.rules)
                .unwrap_or_default();
            if rules.iter().any(|r| r.allows(check)) {
                return true;
            }
        }
        false
    }

    fn check(kind: &ResourceKind, namespace: Option<&str>, verb: &str, name: Option<&str>) -> AccessCheck {
        AccessCheck {
            namespace: namespace.map(String::from),
            verb: verb.to_string(),
            group: kind.group.to_string(),
            resource: kind.plural.to_string(),
            subresource: None,
            name: name.map(String::from),
        }
    }

    fn key(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<ObjectKey> {
        let namespace = if kind.namespaced {
            namespace.ok_or_else(|| ClusterError::Invalid {
                message: format!("{} requires a namespace", kind.plural),
            })?
        } else {
            ""
        };
        Ok(ObjectKey {
            resource: resource_key(kind),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    fn publish(&self, key: &ObjectKey, event_type: WatchEventType, object: Value) {
        // no receivers is fine
        let _ = self.inner.events.send(StoredEvent {
            resource: key.resource.clone(),
            namespace: key.namespace.clone(),
            event: RawWatchEvent { event_type, object },
        });
    }

    fn check_version(existing: &Value, incoming: &Value, kind: &ResourceKind, name: &str) -> ClusterResult<()> {
        let incoming_rv = meta_str(incoming, "resourceVersion");
        if incoming_rv.is_some_and(|rv| Some(rv) != meta_str(existing, "resourceVersion")) {
            return Err(ClusterError::Conflict {
                kind: kind.plural.to_string(),
                name: name.to_string(),
                message: "the object has been modified; please apply your changes to the latest version and try again".into(),
            });
        }
        Ok(())
    }

    fn cascade(state: &mut State, root_uid: Option<String>, deleted_namespace: Option<&str>) -> Vec<(ObjectKey, Value)> {
        let mut removed = Vec::new();
        if let Some(ns) = deleted_namespace {
            let keys: Vec<ObjectKey> = state
                .objects
                .keys()
                .filter(|k| k.namespace == ns)
                .cloned()
                .collect();
            for key in keys {
                if let Some(object) = state.objects.remove(&key) {
                    removed.push((key, object));
                }
            }
        }
        let mut uids: HashSet<String> = root_uid.into_iter().collect();
        loop {
            let dependents: Vec<ObjectKey> = state
                .objects
                .iter()
                .filter(|(_, v)| owner_uids(v).iter().any(|u| uids.contains(u)))
                .map(|(k, _)| k.clone())
                .collect();
            if dependents.is_empty() {
                break;
            }
            for key in dependents {
                if let Some(object) = state.objects.remove(&key) {
                    if let Some(uid) = meta_str(&object, "uid") {
                        let _ = uids.insert(uid.to_string());
                    }
                    removed.push((key, object));
                }
            }
        }
        removed
    }
}

#[async_trait]
impl ObjectStore for MemoryClient {
    async fn get(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<Value> {
        self.authorize(&Self::check(kind, namespace, "get", Some(name)))?;
        let key = Self::key(kind, namespace, name)?;
        self.inner
            .state
            .read()
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::not_found(kind.plural, name))
    }

    async fn list(&self, kind: &ResourceKind, namespace: Option<&str>, params: &ListParams) -> ClusterResult<Vec<Value>> {
        self.authorize(&Self::check(kind, namespace, "list", None))?;
        let resource = resource_key(kind);
        let state = self.inner.state.read();
        let mut out = Vec::new();
        for (key, object) in &state.objects {
            if key.resource != resource || namespace.is_some_and(|ns| ns != key.namespace) {
                continue;
            }
            if params.matches(&labels_of(object))? {
                out.push(object.clone());
            }
        }
        Ok(out)
    }

    async fn create(&self, kind: &ResourceKind, namespace: Option<&str>, mut object: Value) -> ClusterResult<Value> {
        let name = meta_str(&object, "name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ClusterError::Invalid {
                message: "metadata.name is required".into(),
            })?
            .to_string();
        self.authorize(&Self::check(kind, namespace, "create", None))?;
        let key = Self::key(kind, namespace, &name)?;

        let stored = {
            let mut state = self.inner.state.write();
            if state.objects.contains_key(&key) {
                return Err(ClusterError::AlreadyExists {
                    kind: kind.plural.to_string(),
                    name,
                });
            }
            if kind.namespaced {
                let ns_key = ObjectKey {
                    resource: resource_key(&ResourceKind::of::<Namespace>()),
                    namespace: String::new(),
                    name: key.namespace.clone(),
                };
                if !state.objects.contains_key(&ns_key) {
                    return Err(ClusterError::not_found("namespaces", &key.namespace));
                }
                set_meta(&mut object, "namespace", json!(key.namespace));
            }
            if kind.status_subresource {
                if let Some(map) = object.as_object_mut() {
                    let _ = map.remove("status");
                }
            }
            state.revision += 1;
            set_meta(&mut object, "uid", json!(uuid::Uuid::now_v7().to_string()));
            set_meta(&mut object, "resourceVersion", json!(state.revision.to_string()));
            set_meta(&mut object, "creationTimestamp", json!(Utc::now()));
            let _ = state.objects.insert(key.clone(), object.clone());
            object
        };
        debug!(resource = %kind, namespace = %key.namespace, name = %key.name, "created");
        self.publish(&key, WatchEventType::Added, stored.clone());
        Ok(stored)
    }

    async fn replace(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str, mut object: Value) -> ClusterResult<Value> {
        self.authorize(&Self::check(kind, namespace, "update", Some(name)))?;
        let key = Self::key(kind, namespace, name)?;
        let stored = {
            let mut state = self.inner.state.write();
            let existing = state
                .objects
                .get(&key)
                .ok_or_else(|| ClusterError::not_found(kind.plural, name))?;
            Self::check_version(existing, &object, kind, name)?;
            for field in ["uid", "creationTimestamp", "namespace", "name"] {
                if let Some(v) = existing.get("metadata").and_then(|m| m.get(field)) {
                    set_meta(&mut object, field, v.clone());
                }
            }
            if kind.status_subresource {
                let status = existing.get("status").cloned();
                if let Some(map) = object.as_object_mut() {
                    match status {
                        Some(status) => {
                            let _ = map.insert("status".into(), status);
                        }
                        None => {
                            let _ = map.remove("status");
                        }
                    }
                }
            }
            state.revision += 1;
            set_meta(&mut object, "resourceVersion", json!(state.revision.to_string()));
            let _ = state.objects.insert(key.clone(), object.clone());
            object
        };
        self.publish(&key, WatchEventType::Modified, stored.clone());
        Ok(stored)
    }

    async fn replace_status(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str, object: Value) -> ClusterResult<Value> {
        self.authorize(&Self::check(kind, namespace, "update", Some(name)).subresource("status"))?;
        let key = Self::key(kind, namespace, name)?;
        let stored = {
            let mut state = self.inner.state.write();
            let existing = state
                .objects
                .get(&key)
                .ok_or_else(|| ClusterError::not_found(kind.plural, name))?;
            Self::check_version(existing, &object, kind, name)?;
            let mut updated = existing.clone();
            if let Some(map) = updated.as_object_mut() {
                match object.get("status") {
                    Some(status) => {
                        let _ = map.insert("status".into(), status.clone());
                    }
                    None => {
                        let _ = map.remove("status");
                    }
                }
            }
            state.revision += 1;
            set_meta(&mut updated, "resourceVersion", json!(state.revision.to_string()));
            let _ = state.objects.insert(key.clone(), updated.clone());
            updated
        };
        self.publish(&key, WatchEventType::Modified, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<()> {
        self.authorize(&Self::check(kind, namespace, "delete", Some(name)))?;
        let key = Self::key(kind, namespace, name)?;
        let removed = {
            let mut state = self.inner.state.write();
            let object = state
                .objects
                .remove(&key)
                .ok_or_else(|| ClusterError::not_found(kind.plural, name))?;
            let uid = meta_str(&object, "uid").map(String::from);
            let deleted_namespace = (kind.plural == "namespaces" && kind.group.is_empty()).then_some(name);
            let mut removed = vec![(key, object)];
            removed.extend(Self::cascade(&mut state, uid, deleted_namespace));
            removed
        };
        debug!(resource = %kind, name, cascaded = removed.len() - 1, "deleted");
        for (key, object) in removed {
            self.publish(&key, WatchEventType::Deleted, object);
        }
        Ok(())
    }

    async fn watch(&self, kind: &ResourceKind, namespace: Option<&str>) -> ClusterResult<RawWatchStream> {
        self.authorize(&Self::check(kind, namespace, "watch", None))?;
        let resource = resource_key(kind);
        let scope = namespace.map(String::from);
        // subscribe before the snapshot so nothing falls between them
        let rx = self.inner.events.subscribe();
        let initial: Vec<Value> = self
            .inner
            .state
            .read()
            .objects
            .iter()
            .filter(|(k, _)| k.resource == resource && scope.as_deref().is_none_or(|ns| ns == k.namespace))
            .map(|(_, v)| v.clone())
            .collect();

        let stream = async_stream::stream! {
            for object in initial {
                yield Ok(RawWatchEvent { event_type: WatchEventType::Added, object });
            }
            let mut events = BroadcastStream::new(rx);
            while let Some(item) = events.next().await {
                match item {
                    Ok(stored) => {
                        if stored.resource == resource
                            && scope.as_deref().is_none_or(|ns| ns == stored.namespace)
                        {
                            yield Ok(stored.event);
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        yield Err(ClusterError::Watch {
                            message: format!("watch fell behind by {missed} events"),
                        });
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn pod_logs(&self, namespace: &str, pod: &str, tail_lines: Option<u32>) -> ClusterResult<String> {
        let kind = ResourceKind::of::<Pod>();
        self.authorize(&Self::check(&kind, Some(namespace), "get", Some(pod)).subresource("log"))?;
        let state = self.inner.state.read();
        let logs = state
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .ok_or_else(|| ClusterError::not_found("pods", pod))?;
        Ok(match tail_lines {
            Some(n) => {
                let lines: Vec<&str> = logs.lines().collect();
                let start = lines.len().saturating_sub(n as usize);
                lines[start..].join("\n")
            }
            None => logs.clone(),
        })
    }

    async fn request_token(&self, namespace: &str, service_account: &str, ttl_secs: u64) -> ClusterResult<String> {
        let kind = ResourceKind::of::<ServiceAccount>();
        self.authorize(
            &Self::check(&kind, Some(namespace), "create", Some(service_account)).subresource("token"),
        )?;
        let key = Self::key(&kind, Some(namespace), service_account)?;
        if !self.inner.state.read().objects.contains_key(&key) {
            return Err(ClusterError::not_found("serviceaccounts", service_account));
        }
        let username = format!("system:serviceaccount:{namespace}:{service_account}");
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: &username,
            iss: "ambient-in-memory",
            iat: now,
            exp: now + i64::try_from(ttl_secs).unwrap_or(i64::MAX / 2),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.inner.signing_key).map_err(|e| {
            ClusterError::Api {
                status: 500,
                message: format!("token signing failed: {e}"),
            }
        })?;
        let _ = self.inner.tokens.write().insert(
            token.clone(),
            UserInfo {
                username,
                groups: vec![
                    "system:serviceaccounts".to_string(),
                    format!("system:serviceaccounts:{namespace}"),
                    "system:authenticated".to_string(),
                ],
            },
        );
        Ok(token)
    }

    async fn review_access(&self, check: &AccessCheck) -> ClusterResult<bool> {
        Ok(match self.resolve()? {
            Resolved::Service => true,
            Resolved::User(user) => self.allowed(&user, check),
        })
    }

    async fn whoami(&self) -> ClusterResult<UserInfo> {
        Ok(match self.resolve()? {
            Resolved::Service => UserInfo {
                username: SERVICE_USERNAME.to_string(),
                groups: vec!["system:serviceaccounts".to_string()],
            },
            Resolved::User(user) => user,
        })
    }
}

// ── JSON helpers ────────────────────────────────────────────────────────────

fn resource_key(kind: &ResourceKind) -> String {
    format!("{}/{}", kind.group, kind.plural)
}

fn meta_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object.get("metadata")?.get(field)?.as_str()
}

fn set_meta(object: &mut Value, field: &str, value: Value) {
    if let Some(map) = object.as_object_mut() {
        let meta = map.entry("metadata").or_insert_with(|| json!({}));
        if let Some(meta) = meta.as_object_mut() {
            let _ = meta.insert(field.to_string(), value);
        }
    }
}

fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn owner_uids(object: &Value) -> Vec<String> {
    object
        .get("metadata")
        .and_then(|m| m.get("ownerReferences"))
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("uid")?.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ambient_core::ObjectMeta;
    use ambient_core::resources::{AgenticSession, AgenticSessionSpec, ProjectRole, Resource};
    use assert_matches::assert_matches;

    use super::*;
    use crate::api::{Api, WatchEvent};
    use crate::objects::{Job, JobStatus, RoleRef, Secret, Subject, project_cluster_roles};

    fn session(name: &str) -> AgenticSession {
        AgenticSession::new(
            ObjectMeta::named(name, "team"),
            AgenticSessionSpec {
                prompt: "work".into(),
                ..AgenticSessionSpec::default()
            },
        )
    }

    async fn cluster_with_namespace() -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        let namespaces = Api::<Namespace>::all(cluster.service());
        namespaces
            .create(&Namespace {
                metadata: ObjectMeta::cluster_scoped("team"),
                status: None,
            })
            .await
            .unwrap();
        let roles = Api::<ClusterRole>::all(cluster.service());
        for role in project_cluster_roles() {
            roles.create(&role).await.unwrap();
        }
        cluster
    }

    async fn grant(cluster: &InMemoryCluster, user: &str, role: ProjectRole) {
        let bindings = Api::<RoleBinding>::namespaced(cluster.service(), "team");
        bindings
            .create(&RoleBinding {
                metadata: ObjectMeta::named(format!("{user}-{role}"), "team"),
                subjects: vec![Subject::principal("User", user)],
                role_ref: RoleRef::cluster_role(&role.cluster_role()),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_assigns_identity_fields() {
        let cluster = cluster_with_namespace().await;
        let api = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        let created = api.create(&session("s1")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());
        assert!(created.metadata.creation_timestamp.is_some());
        assert_matches!(api.create(&session("s1")).await, Err(ClusterError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_in_missing_namespace_fails() {
        let cluster = InMemoryCluster::new();
        let api = Api::<AgenticSession>::namespaced(cluster.service(), "nowhere");
        assert_matches!(api.create(&session("s1")).await, Err(ClusterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stale_resource_version_conflicts() {
        let cluster = cluster_with_namespace().await;
        let api = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        let created = api.create(&session("s1")).await.unwrap();

        let mut first = created.clone();
        first.spec.prompt = "first".into();
        api.replace(&first).await.unwrap();

        let mut second = created;
        second.spec.prompt = "second".into();
        assert_matches!(api.replace(&second).await, Err(ClusterError::Conflict { .. }));
        assert_eq!(api.get("s1").await.unwrap().spec.prompt, "first");
    }

    #[tokio::test]
    async fn replace_preserves_status_and_status_write_preserves_spec() {
        let cluster = cluster_with_namespace().await;
        let api = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        let mut s = api.create(&session("s1")).await.unwrap();
        s.status_mut().phase = ambient_core::SessionPhase::Creating;
        let s = api.replace_status(&s).await.unwrap();

        let mut edited = s.clone();
        edited.spec.prompt = "changed".into();
        edited.status = None;
        let edited = api.replace(&edited).await.unwrap();
        assert_eq!(edited.phase(), ambient_core::SessionPhase::Creating);
        assert_eq!(edited.spec.prompt, "changed");
    }

    #[tokio::test]
    async fn delete_cascades_to_owned_objects() {
        let cluster = cluster_with_namespace().await;
        let sessions = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        let owner = sessions.create(&session("s1")).await.unwrap();

        let jobs = Api::<Job>::namespaced(cluster.service(), "team");
        let job = Job {
            metadata: ObjectMeta::named("s1-job", "team").owned_by(owner.owner_reference()),
            ..Job::default()
        };
        let job = jobs.create(&job).await.unwrap();
        let secrets = Api::<Secret>::namespaced(cluster.service(), "team");
        let secret = Secret::opaque(
            ObjectMeta::named("grandchild", "team").owned_by(job.owner_reference()),
            "k",
            "v",
        );
        secrets.create(&secret).await.unwrap();

        sessions.delete("s1").await.unwrap();
        assert!(jobs.get_opt("s1-job").await.unwrap().is_none());
        assert!(secrets.get_opt("grandchild").await.unwrap().is_none());
        assert!(!sessions.delete_opt("s1").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_namespace_removes_contents() {
        let cluster = cluster_with_namespace().await;
        let sessions = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        sessions.create(&session("s1")).await.unwrap();
        Api::<Namespace>::all(cluster.service()).delete("team").await.unwrap();
        assert_eq!(cluster.count(&ResourceKind::of::<AgenticSession>(), "team"), 0);
    }

    #[tokio::test]
    async fn list_filters_by_label() {
        let cluster = cluster_with_namespace().await;
        let api = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        let mut tagged = session("a");
        tagged.metadata = tagged.metadata.with_label("ambient-code.io/workflow", "wf1");
        api.create(&tagged).await.unwrap();
        api.create(&session("b")).await.unwrap();

        let all = api.list(&ListParams::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        let filtered = api
            .list(&ListParams::default().labels("ambient-code.io/workflow", "wf1"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].metadata.name, "a");
    }

    #[tokio::test]
    async fn watch_replays_then_streams() {
        let cluster = cluster_with_namespace().await;
        let api = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        api.create(&session("existing")).await.unwrap();

        let mut watch = Api::<AgenticSession>::all(cluster.service()).watch().await.unwrap();
        let first = watch.next().await.unwrap().unwrap();
        assert_matches!(first, WatchEvent::Added(s) if s.metadata.name == "existing");

        api.create(&session("fresh")).await.unwrap();
        api.delete("existing").await.unwrap();
        let added = tokio::time::timeout(Duration::from_secs(1), watch.next()).await.unwrap();
        assert_matches!(added, Some(Ok(WatchEvent::Added(s))) if s.metadata.name == "fresh");
        let deleted = tokio::time::timeout(Duration::from_secs(1), watch.next()).await.unwrap();
        assert_matches!(deleted, Some(Ok(WatchEvent::Deleted(s))) if s.metadata.name == "existing");
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let cluster = cluster_with_namespace().await;
        let api = Api::<AgenticSession>::namespaced(cluster.for_token("nope"), "team");
        assert_matches!(api.list(&ListParams::default()).await, Err(ClusterError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn role_bindings_drive_authorization() {
        let cluster = cluster_with_namespace().await;
        cluster.register_user("alice-token", "alice", &[]);
        cluster.register_user("bob-token", "bob", &[]);
        grant(&cluster, "alice", ProjectRole::Edit).await;
        grant(&cluster, "bob", ProjectRole::View).await;

        let alice = Api::<AgenticSession>::namespaced(cluster.for_token("alice-token"), "team");
        alice.create(&session("s1")).await.unwrap();

        let bob = Api::<AgenticSession>::namespaced(cluster.for_token("bob-token"), "team");
        assert_eq!(bob.list(&ListParams::default()).await.unwrap().len(), 1);
        assert_matches!(bob.create(&session("s2")).await, Err(ClusterError::Forbidden { .. }));

        let bob_store = cluster.for_token("bob-token");
        let check = AccessCheck::for_kind::<AgenticSession>("team", "delete");
        assert!(!bob_store.review_access(&check).await.unwrap());
        let alice_store = cluster.for_token("alice-token");
        assert!(alice_store.review_access(&check).await.unwrap());
        let bindings = AccessCheck::for_kind::<RoleBinding>("team", "create");
        assert!(!alice_store.review_access(&bindings).await.unwrap());
    }

    #[tokio::test]
    async fn group_bindings_apply() {
        let cluster = cluster_with_namespace().await;
        cluster.register_user("carol-token", "carol", &["team-x"]);
        let bindings = Api::<RoleBinding>::namespaced(cluster.service(), "team");
        bindings
            .create(&RoleBinding {
                metadata: ObjectMeta::named("group-admin", "team"),
                subjects: vec![Subject::principal("Group", "team-x")],
                role_ref: RoleRef::cluster_role("ambient-project-admin"),
            })
            .await
            .unwrap();
        let carol = cluster.for_token("carol-token");
        let check = AccessCheck::for_kind::<RoleBinding>("team", "create");
        assert!(carol.review_access(&check).await.unwrap());
    }

    #[tokio::test]
    async fn service_account_tokens_resolve_and_die_with_account() {
        let cluster = cluster_with_namespace().await;
        let accounts = Api::<ServiceAccount>::namespaced(cluster.service(), "team");
        accounts
            .create(&ServiceAccount {
                metadata: ObjectMeta::named("runner", "team"),
            })
            .await
            .unwrap();
        let token = cluster.service().request_token("team", "runner", 3600).await.unwrap();
        assert_eq!(token.split('.').count(), 3);

        let who = cluster.for_token(&token).whoami().await.unwrap();
        assert_eq!(who.username, "system:serviceaccount:team:runner");

        accounts.delete("runner").await.unwrap();
        assert_matches!(cluster.for_token(&token).whoami().await, Err(ClusterError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn scoped_role_limits_to_named_object() {
        let cluster = cluster_with_namespace().await;
        let sessions = Api::<AgenticSession>::namespaced(cluster.service(), "team");
        sessions.create(&session("mine")).await.unwrap();
        sessions.create(&session("other")).await.unwrap();
        Api::<ServiceAccount>::namespaced(cluster.service(), "team")
            .create(&ServiceAccount {
                metadata: ObjectMeta::named("runner", "team"),
            })
            .await
            .unwrap();
        Api::<Role>::namespaced(cluster.service(), "team")
            .create(&Role {
                metadata: ObjectMeta::named("runner", "team"),
                rules: vec![
                    crate::objects::PolicyRule::new(AgenticSession::GROUP, &["agenticsessions"], &["get"])
                        .for_names(&["mine"]),
                ],
            })
            .await
            .unwrap();
        Api::<RoleBinding>::namespaced(cluster.service(), "team")
            .create(&RoleBinding {
                metadata: ObjectMeta::named("runner", "team"),
                subjects: vec![Subject::service_account("team", "runner")],
                role_ref: RoleRef::role("runner"),
            })
            .await
            .unwrap();
        let token = cluster.service().request_token("team", "runner", 3600).await.unwrap();
        let runner = Api::<AgenticSession>::namespaced(cluster.for_token(&token), "team");
        assert!(runner.get("mine").await.is_ok());
        assert_matches!(runner.get("other").await, Err(ClusterError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn pod_logs_tail() {
        let cluster = cluster_with_namespace().await;
        cluster.set_pod_logs("team", "p1", "one\ntwo\nthree");
        let logs = cluster.service().pod_logs("team", "p1", Some(2)).await.unwrap();
        assert_eq!(logs, "two\nthree");
        assert_matches!(
            cluster.service().pod_logs("team", "p2", None).await,
            Err(ClusterError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn job_status_is_a_subresource() {
        let cluster = cluster_with_namespace().await;
        let jobs = Api::<Job>::namespaced(cluster.service(), "team");
        let mut job = Job {
            metadata: ObjectMeta::named("j", "team"),
            ..Job::default()
        };
        job.status = Some(JobStatus {
            succeeded: Some(1),
            ..JobStatus::default()
        });
        let mut created = jobs.create(&job).await.unwrap();
        assert_eq!(created.succeeded(), 0);
        created.status = Some(JobStatus {
            failed: Some(2),
            ..JobStatus::default()
        });
        let updated = jobs.replace_status(&created).await.unwrap();
        assert_eq!(updated.failed(), 2);
    }
}

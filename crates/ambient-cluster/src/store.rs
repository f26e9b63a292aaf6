//! The object-store boundary.
//!
//! [`ObjectStore`] is the dynamic, untyped view of the cluster: objects are
//! `serde_json::Value`s addressed by a [`ResourceKind`]. Each store instance
//! acts as exactly one identity. [`ClusterConnector`] hands out the service
//! identity's store and caller-scoped stores built from bearer tokens.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use ambient_core::Resource;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ClusterError, ClusterResult};

/// Where a kind lives in the API hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    /// API group (`""` for core).
    pub group: &'static str,
    /// API version.
    pub version: &'static str,
    /// Kind name.
    pub kind: &'static str,
    /// Lowercase plural.
    pub plural: &'static str,
    /// Namespaced or cluster-scoped.
    pub namespaced: bool,
    /// Whether `status` is written only through the status sub-resource.
    pub status_subresource: bool,
}

impl ResourceKind {
    /// Descriptor of a typed resource.
    pub fn of<K: Resource>() -> Self {
        Self {
            group: K::GROUP,
            version: K::VERSION,
            kind: K::KIND,
            plural: K::PLURAL,
            namespaced: K::NAMESPACED,
            status_subresource: K::STATUS_SUBRESOURCE,
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// List parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Filters for list calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Label selector in the standard `k=v,k2!=v2,k3` syntax.
    pub label_selector: Option<String>,
}

impl ListParams {
    /// Builder: require `key=value`.
    #[must_use]
    pub fn labels(mut self, key: &str, value: &str) -> Self {
        let clause = format!("{key}={value}");
        self.label_selector = Some(match self.label_selector.take() {
            Some(existing) if !existing.is_empty() => format!("{existing},{clause}"),
            _ => clause,
        });
        self
    }

    /// Evaluate the selector against a label map.
    pub fn matches<'a, I>(&self, labels: I) -> ClusterResult<bool>
    where
        I: IntoIterator<Item = (&'a String, &'a String)> + Clone,
    {
        let Some(selector) = self.label_selector.as_deref() else {
            return Ok(true);
        };
        for clause in selector.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let lookup = |key: &str| {
                labels
                    .clone()
                    .into_iter()
                    .find(|(k, _)| k.as_str() == key)
                    .map(|(_, v)| v.as_str())
            };
            let ok = if let Some((key, value)) = clause.split_once("!=") {
                lookup(key.trim()) != Some(value.trim())
            } else if let Some((key, value)) = clause
                .split_once("==")
                .or_else(|| clause.split_once('='))
            {
                lookup(key.trim()) == Some(value.trim())
            } else if let Some(key) = clause.strip_prefix('!') {
                lookup(key.trim()).is_none()
            } else if clause.chars().all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c)) {
                lookup(clause).is_some()
            } else {
                return Err(ClusterError::Invalid {
                    message: format!("unsupported label selector clause '{clause}'"),
                });
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch
// ─────────────────────────────────────────────────────────────────────────────

/// Watch event type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    /// Object created (or present when the watch started).
    Added,
    /// Object changed.
    Modified,
    /// Object removed.
    Deleted,
}

/// Untyped watch event.
#[derive(Clone, Debug, PartialEq)]
pub struct RawWatchEvent {
    /// What happened.
    pub event_type: WatchEventType,
    /// Object state after the event (last state for deletions).
    pub object: Value,
}

/// Boxed stream of untyped watch events.
pub type RawWatchStream = Pin<Box<dyn Stream<Item = ClusterResult<RawWatchEvent>> + Send>>;

// ─────────────────────────────────────────────────────────────────────────────
// Identity and access review
// ─────────────────────────────────────────────────────────────────────────────

/// One authorization question: may this identity do `verb` on `resource`?
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheck {
    /// Namespace, `None` for cluster-scoped resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Verb (`get`, `list`, `create`, `update`, `patch`, `delete`, `watch`).
    pub verb: String,
    /// API group of the resource.
    pub group: String,
    /// Lowercase plural.
    pub resource: String,
    /// Sub-resource (`status`, `log`, `token`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subresource: Option<String>,
    /// Specific object name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AccessCheck {
    /// Check `verb` on kind `K` in `namespace`.
    pub fn for_kind<K: Resource>(namespace: &str, verb: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            verb: verb.to_string(),
            group: K::GROUP.to_string(),
            resource: K::PLURAL.to_string(),
            subresource: None,
            name: None,
        }
    }

    /// Builder: restrict to one object.
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Builder: target a sub-resource.
    #[must_use]
    pub fn subresource(mut self, subresource: &str) -> Self {
        self.subresource = Some(subresource.to_string());
        self
    }

    /// `resource` or `resource/subresource`, as written in policy rules.
    pub fn resource_path(&self) -> String {
        match &self.subresource {
            Some(sub) => format!("{}/{sub}", self.resource),
            None => self.resource.clone(),
        }
    }
}

/// Authenticated identity of a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name (`system:serviceaccount:<ns>:<name>` for service accounts).
    pub username: String,
    /// Group memberships.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserInfo {
    /// `(namespace, name)` when this identity is a service account.
    pub fn service_account(&self) -> Option<(&str, &str)> {
        let rest = self.username.strip_prefix("system:serviceaccount:")?;
        rest.split_once(':')
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Untyped access to cluster objects as one identity.
///
/// Writes use optimistic concurrency: an object carrying a stale
/// `metadata.resourceVersion` is rejected with [`ClusterError::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<Value>;

    /// List objects, across all namespaces when `namespace` is `None`.
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> ClusterResult<Vec<Value>>;

    /// Create an object.
    async fn create(&self, kind: &ResourceKind, namespace: Option<&str>, object: Value) -> ClusterResult<Value>;

    /// Replace an object (status is preserved for kinds with a status sub-resource).
    async fn replace(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        object: Value,
    ) -> ClusterResult<Value>;

    /// Replace only the status of an object.
    async fn replace_status(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        object: Value,
    ) -> ClusterResult<Value>;

    /// Delete an object; dependents owned by it are removed in the background.
    async fn delete(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<()>;

    /// Watch a kind, across all namespaces when `namespace` is `None`.
    async fn watch(&self, kind: &ResourceKind, namespace: Option<&str>) -> ClusterResult<RawWatchStream>;

    /// Tail of a pod's log.
    async fn pod_logs(&self, namespace: &str, pod: &str, tail_lines: Option<u32>) -> ClusterResult<String>;

    /// Mint a bound token for a service account.
    async fn request_token(&self, namespace: &str, service_account: &str, ttl_secs: u64) -> ClusterResult<String>;

    /// Whether this store's identity may perform `check`.
    async fn review_access(&self, check: &AccessCheck) -> ClusterResult<bool>;

    /// This store's identity.
    async fn whoami(&self) -> ClusterResult<UserInfo>;
}

/// Hands out stores for the service identity and for callers.
pub trait ClusterConnector: Send + Sync {
    /// Store acting as the service's own identity.
    fn service(&self) -> Arc<dyn ObjectStore>;

    /// Store acting as the holder of `token`.
    ///
    /// Construction never fails; an invalid token surfaces as
    /// [`ClusterError::Unauthorized`] on first use.
    fn for_token(&self, token: &str) -> Arc<dyn ObjectStore>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_all() {
        assert!(ListParams::default().matches(&labels(&[])).unwrap());
    }

    #[test]
    fn equality_and_inequality() {
        let l = labels(&[("app", "x"), ("tier", "web")]);
        let eq = ListParams::default().labels("app", "x");
        assert!(eq.matches(&l).unwrap());
        let both = eq.labels("tier", "db");
        assert!(!both.matches(&l).unwrap());
        let ne = ListParams {
            label_selector: Some("tier!=db".into()),
        };
        assert!(ne.matches(&l).unwrap());
    }

    #[test]
    fn existence_clauses() {
        let l = labels(&[("ambient-code.io/managed", "true")]);
        let has = ListParams {
            label_selector: Some("ambient-code.io/managed".into()),
        };
        assert!(has.matches(&l).unwrap());
        let not = ListParams {
            label_selector: Some("!ambient-code.io/managed".into()),
        };
        assert!(!not.matches(&l).unwrap());
    }

    #[test]
    fn malformed_selector_rejected() {
        let bad = ListParams {
            label_selector: Some("app in (x,y)".into()),
        };
        assert!(bad.matches(&labels(&[])).is_err());
    }

    #[test]
    fn service_account_identity() {
        let sa = UserInfo {
            username: "system:serviceaccount:team:ambient-key-ci-1".into(),
            groups: vec![],
        };
        assert_eq!(sa.service_account(), Some(("team", "ambient-key-ci-1")));
        let user = UserInfo {
            username: "alice".into(),
            groups: vec![],
        };
        assert_eq!(user.service_account(), None);
    }

    #[test]
    fn access_check_resource_path() {
        let check = AccessCheck {
            resource: "agenticsessions".into(),
            ..AccessCheck::default()
        }
        .subresource("status");
        assert_eq!(check.resource_path(), "agenticsessions/status");
    }
}

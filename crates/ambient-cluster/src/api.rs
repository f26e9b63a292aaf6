//! Typed access on top of [`ObjectStore`].
//!
//! [`Api<K>`] is the only place typed resources are converted to and from
//! the untyped representation ([`to_dynamic`] / [`from_dynamic`]).

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use ambient_core::Resource;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::errors::{ClusterError, ClusterResult};
use crate::store::{ListParams, ObjectStore, ResourceKind, WatchEventType};

/// Serialize a typed resource, stamping `apiVersion` and `kind`.
pub fn to_dynamic<K: Resource>(object: &K) -> ClusterResult<Value> {
    let mut value = serde_json::to_value(object)?;
    if let Value::Object(map) = &mut value {
        let _ = map.insert("apiVersion".into(), Value::String(K::api_version()));
        let _ = map.insert("kind".into(), Value::String(K::KIND.to_string()));
    }
    Ok(value)
}

/// Deserialize a typed resource; unknown fields are ignored.
pub fn from_dynamic<K: Resource>(value: Value) -> ClusterResult<K> {
    Ok(serde_json::from_value(value)?)
}

/// Typed watch event.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent<K> {
    /// Object created.
    Added(K),
    /// Object changed.
    Modified(K),
    /// Object removed.
    Deleted(K),
}

impl<K> WatchEvent<K> {
    /// The object carried by the event.
    pub fn object(&self) -> &K {
        match self {
            Self::Added(k) | Self::Modified(k) | Self::Deleted(k) => k,
        }
    }
}

/// Boxed stream of typed watch events.
pub type WatchStream<K> = Pin<Box<dyn Stream<Item = ClusterResult<WatchEvent<K>>> + Send>>;

/// Typed handle for one kind, scoped to a namespace or to all of them.
pub struct Api<K> {
    store: Arc<dyn ObjectStore>,
    namespace: Option<String>,
    kind: ResourceKind,
    _marker: PhantomData<fn() -> K>,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            kind: self.kind,
            _marker: PhantomData,
        }
    }
}

impl<K: Resource> Api<K> {
    /// Handle for objects in `namespace`.
    pub fn namespaced(store: Arc<dyn ObjectStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: Some(namespace.to_string()),
            kind: ResourceKind::of::<K>(),
            _marker: PhantomData,
        }
    }

    /// Handle across all namespaces (list/watch), or for a cluster-scoped kind.
    pub fn all(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            namespace: None,
            kind: ResourceKind::of::<K>(),
            _marker: PhantomData,
        }
    }

    /// Namespace scope of this handle.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn scope(&self) -> ClusterResult<Option<&str>> {
        match (self.kind.namespaced, self.namespace.as_deref()) {
            (true, None) => Err(ClusterError::Invalid {
                message: format!("{} requires a namespace", self.kind.plural),
            }),
            (true, ns) => Ok(ns),
            (false, _) => Ok(None),
        }
    }

    /// Fetch by name.
    pub async fn get(&self, name: &str) -> ClusterResult<K> {
        let value = self.store.get(&self.kind, self.scope()?, name).await?;
        from_dynamic(value)
    }

    /// Fetch by name, `None` when missing.
    pub async fn get_opt(&self, name: &str) -> ClusterResult<Option<K>> {
        match self.get(name).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List matching objects.
    pub async fn list(&self, params: &ListParams) -> ClusterResult<Vec<K>> {
        let namespace = if self.kind.namespaced {
            self.namespace.as_deref()
        } else {
            None
        };
        self.store
            .list(&self.kind, namespace, params)
            .await?
            .into_iter()
            .map(from_dynamic)
            .collect()
    }

    /// Create; the handle's namespace is filled in when the object has none.
    pub async fn create(&self, object: &K) -> ClusterResult<K> {
        let namespace = self.scope()?;
        let mut object = object.clone();
        if let Some(ns) = namespace {
            let _ = object.meta_mut().namespace.get_or_insert_with(|| ns.to_string());
        }
        let value = self.store.create(&self.kind, namespace, to_dynamic(&object)?).await?;
        from_dynamic(value)
    }

    /// Replace; fails with `Conflict` when the object's version is stale.
    pub async fn replace(&self, object: &K) -> ClusterResult<K> {
        let name = object.meta().name.clone();
        let value = self
            .store
            .replace(&self.kind, self.scope()?, &name, to_dynamic(object)?)
            .await?;
        from_dynamic(value)
    }

    /// Replace only the status.
    pub async fn replace_status(&self, object: &K) -> ClusterResult<K> {
        let name = object.meta().name.clone();
        let value = self
            .store
            .replace_status(&self.kind, self.scope()?, &name, to_dynamic(object)?)
            .await?;
        from_dynamic(value)
    }

    /// Delete by name.
    pub async fn delete(&self, name: &str) -> ClusterResult<()> {
        self.store.delete(&self.kind, self.scope()?, name).await
    }

    /// Delete by name, returning whether anything was deleted.
    pub async fn delete_opt(&self, name: &str) -> ClusterResult<bool> {
        match self.delete(name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Watch this kind within the handle's scope.
    pub async fn watch(&self) -> ClusterResult<WatchStream<K>> {
        let raw = self.store.watch(&self.kind, self.namespace.as_deref()).await?;
        Ok(Box::pin(raw.map(|event| {
            let event = event?;
            let object = from_dynamic::<K>(event.object)?;
            Ok(match event.event_type {
                WatchEventType::Added => WatchEvent::Added(object),
                WatchEventType::Modified => WatchEvent::Modified(object),
                WatchEventType::Deleted => WatchEvent::Deleted(object),
            })
        })))
    }
}

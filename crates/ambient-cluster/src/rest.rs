//! Kubernetes-compatible REST adapter.
//!
//! Speaks the plain JSON API: core kinds under `/api/v1`, grouped kinds under
//! `/apis/{group}/{version}`, watches as newline-delimited JSON events.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ambient_settings::ClusterSettings;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::errors::{ClusterError, ClusterResult};
use crate::store::{
    AccessCheck, ClusterConnector, ListParams, ObjectStore, RawWatchEvent, RawWatchStream,
    ResourceKind, UserInfo, WatchEventType,
};

/// Builds REST stores for the service identity and for callers.
#[derive(Clone)]
pub struct RestConnector {
    base_url: String,
    client: Client,
    service_token: String,
    timeout: Duration,
}

impl RestConnector {
    /// Connector from explicit parts.
    pub fn new(base_url: &str, client: Client, service_token: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            service_token: service_token.trim().to_string(),
            timeout,
        }
    }

    /// Connector from settings: reads the service token and CA bundle files.
    pub fn from_settings(settings: &ClusterSettings) -> ClusterResult<Self> {
        let token = read_file(Path::new(&settings.service_token_path))?;
        let mut builder = Client::builder().danger_accept_invalid_certs(settings.insecure_skip_tls_verify);
        if let Some(ca_path) = settings.ca_path.as_deref().filter(|p| Path::new(p).exists()) {
            let pem = read_file(Path::new(ca_path))?;
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self::new(
            &settings.api_url,
            builder.build()?,
            &token,
            Duration::from_millis(settings.request_timeout_ms),
        ))
    }

    fn client_for(&self, token: &str) -> Arc<dyn ObjectStore> {
        Arc::new(KubeRestClient {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            token: token.to_string(),
            timeout: self.timeout,
        })
    }
}

impl ClusterConnector for RestConnector {
    fn service(&self) -> Arc<dyn ObjectStore> {
        self.client_for(&self.service_token)
    }

    fn for_token(&self, token: &str) -> Arc<dyn ObjectStore> {
        self.client_for(token)
    }
}

fn read_file(path: &Path) -> ClusterResult<String> {
    std::fs::read_to_string(path).map_err(|e| ClusterError::Invalid {
        message: format!("cannot read {}: {e}", path.display()),
    })
}

/// One identity's view of a REST API server.
pub struct KubeRestClient {
    base_url: String,
    client: Client,
    token: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct WireWatchEvent {
    #[serde(rename = "type")]
    event_type: String,
    object: Value,
}

impl KubeRestClient {
    fn collection_url(&self, kind: &ResourceKind, namespace: Option<&str>) -> String {
        let root = if kind.group.is_empty() {
            format!("{}/api/{}", self.base_url, kind.version)
        } else {
            format!("{}/apis/{}/{}", self.base_url, kind.group, kind.version)
        };
        match (kind.namespaced, namespace) {
            (true, Some(ns)) => format!("{root}/namespaces/{ns}/{}", kind.plural),
            (false, _) | (true, None) => format!("{root}/{}", kind.plural),
        }
    }

    fn object_url(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<String> {
        if kind.namespaced && namespace.is_none() {
            return Err(ClusterError::Invalid {
                message: format!("{} requires a namespace", kind.plural),
            });
        }
        Ok(format!("{}/{name}", self.collection_url(kind, namespace)))
    }

    async fn send(&self, request: RequestBuilder, kind: &str, name: &str) -> ClusterResult<Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StatusBody>(&body)
            .map(|s| s.message)
            .unwrap_or(body);
        debug!(status = status.as_u16(), kind, name, %message, "cluster API error");
        Err(ClusterError::from_status(status.as_u16(), kind, name, message))
    }

    async fn send_json(&self, request: RequestBuilder, kind: &str, name: &str) -> ClusterResult<Value> {
        let response = self.send(request.timeout(self.timeout), kind, name).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ObjectStore for KubeRestClient {
    async fn get(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<Value> {
        let url = self.object_url(kind, namespace, name)?;
        self.send_json(self.client.get(url), kind.plural, name).await
    }

    async fn list(&self, kind: &ResourceKind, namespace: Option<&str>, params: &ListParams) -> ClusterResult<Vec<Value>> {
        let url = self.collection_url(kind, namespace);
        let mut request = self.client.get(url);
        if let Some(selector) = params.label_selector.as_deref() {
            request = request.query(&[("labelSelector", selector)]);
        }
        let body = self.send_json(request, kind.plural, "").await?;
        match body.get("items") {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ClusterError::Invalid {
                message: format!("unexpected list items: {other}"),
            }),
        }
    }

    async fn create(&self, kind: &ResourceKind, namespace: Option<&str>, object: Value) -> ClusterResult<Value> {
        let name = object
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let url = self.collection_url(kind, namespace);
        self.send_json(self.client.post(url).json(&object), kind.plural, &name).await
    }

    async fn replace(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str, object: Value) -> ClusterResult<Value> {
        let url = self.object_url(kind, namespace, name)?;
        self.send_json(self.client.put(url).json(&object), kind.plural, name).await
    }

    async fn replace_status(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str, object: Value) -> ClusterResult<Value> {
        let url = format!("{}/status", self.object_url(kind, namespace, name)?);
        self.send_json(self.client.put(url).json(&object), kind.plural, name).await
    }

    async fn delete(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ClusterResult<()> {
        let url = self.object_url(kind, namespace, name)?;
        let request = self
            .client
            .delete(url)
            .query(&[("propagationPolicy", "Background")])
            .timeout(self.timeout);
        let _ = self.send(request, kind.plural, name).await?;
        Ok(())
    }

    async fn watch(&self, kind: &ResourceKind, namespace: Option<&str>) -> ClusterResult<RawWatchStream> {
        let url = self.collection_url(kind, namespace);
        let request = self.client.get(url).query(&[("watch", "true")]);
        let response = self.send(request, kind.plural, "").await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = BytesMut::with_capacity(8192);
            loop {
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.split_to(pos + 1);
                    let Ok(text) = std::str::from_utf8(&line) else {
                        warn!("skipping non-UTF-8 watch line");
                        continue;
                    };
                    if let Some(event) = parse_watch_line(text) {
                        let failed = event.is_err();
                        yield event;
                        if failed {
                            return;
                        }
                    }
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        yield Err(ClusterError::Http(e));
                        return;
                    }
                    None => {
                        if let Ok(text) = std::str::from_utf8(&buffer) {
                            if let Some(event) = parse_watch_line(text) {
                                yield event;
                            }
                        }
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn pod_logs(&self, namespace: &str, pod: &str, tail_lines: Option<u32>) -> ClusterResult<String> {
        let url = format!("{}/api/v1/namespaces/{namespace}/pods/{pod}/log", self.base_url);
        let mut request = self.client.get(url).timeout(self.timeout);
        if let Some(n) = tail_lines {
            request = request.query(&[("tailLines", n)]);
        }
        Ok(self.send(request, "pods", pod).await?.text().await?)
    }

    async fn request_token(&self, namespace: &str, service_account: &str, ttl_secs: u64) -> ClusterResult<String> {
        let url = format!(
            "{}/api/v1/namespaces/{namespace}/serviceaccounts/{service_account}/token",
            self.base_url
        );
        let body = json!({
            "apiVersion": "authentication.k8s.io/v1",
            "kind": "TokenRequest",
            "spec": {"expirationSeconds": ttl_secs}
        });
        let response = self
            .send_json(self.client.post(url).json(&body), "serviceaccounts", service_account)
            .await?;
        response
            .pointer("/status/token")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ClusterError::Invalid {
                message: "token request returned no token".into(),
            })
    }

    async fn review_access(&self, check: &AccessCheck) -> ClusterResult<bool> {
        let url = format!(
            "{}/apis/authorization.k8s.io/v1/selfsubjectaccessreviews",
            self.base_url
        );
        let body = json!({
            "apiVersion": "authorization.k8s.io/v1",
            "kind": "SelfSubjectAccessReview",
            "spec": {"resourceAttributes": check}
        });
        let response = self
            .send_json(self.client.post(url).json(&body), "selfsubjectaccessreviews", "")
            .await?;
        Ok(response
            .pointer("/status/allowed")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn whoami(&self) -> ClusterResult<UserInfo> {
        let url = format!("{}/apis/authentication.k8s.io/v1/selfsubjectreviews", self.base_url);
        let body = json!({
            "apiVersion": "authentication.k8s.io/v1",
            "kind": "SelfSubjectReview"
        });
        let response = self
            .send_json(self.client.post(url).json(&body), "selfsubjectreviews", "")
            .await?;
        let info = response
            .pointer("/status/userInfo")
            .cloned()
            .ok_or_else(|| ClusterError::Invalid {
                message: "self subject review returned no user".into(),
            })?;
        Ok(serde_json::from_value(info)?)
    }
}

fn parse_watch_line(line: &str) -> Option<ClusterResult<RawWatchEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let wire: WireWatchEvent = match serde_json::from_str(line) {
        Ok(w) => w,
        Err(e) => return Some(Err(e.into())),
    };
    let event_type = match wire.event_type.as_str() {
        "ADDED" => WatchEventType::Added,
        "MODIFIED" => WatchEventType::Modified,
        "DELETED" => WatchEventType::Deleted,
        "BOOKMARK" => return None,
        "ERROR" => {
            let message = wire
                .object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("watch error")
                .to_string();
            return Some(Err(ClusterError::Watch { message }));
        }
        other => {
            return Some(Err(ClusterError::Watch {
                message: format!("unknown watch event type '{other}'"),
            }));
        }
    };
    Some(Ok(RawWatchEvent {
        event_type,
        object: wire.object,
    }))
}

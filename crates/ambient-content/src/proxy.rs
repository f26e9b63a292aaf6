//! Content Service Proxy.
//!
//! Reads and writes tenant workspace files through the tenant's content
//! service. The proxy holds no credential of its own: every call forwards the
//! caller's bearer token, so the content service sees the caller.

use std::time::Duration;

use ambient_settings::{ContentSettings, NAMESPACE_PLACEHOLDER};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::{ContentError, ContentResult};
use crate::path::normalize_path;
use crate::types::{ContentEntry, Encoding, PathQuery, WriteRequest};

/// Client for per-tenant content services.
#[derive(Clone, Debug)]
pub struct ContentProxy {
    client: Client,
    url_template: String,
    timeout: Duration,
}

impl ContentProxy {
    /// Proxy for endpoints built from `url_template` (`{namespace}` placeholder).
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url_template: url_template.into(),
            timeout,
        }
    }

    /// Proxy configured from settings.
    pub fn from_settings(settings: &ContentSettings) -> Self {
        Self::new(
            settings.url_template.clone(),
            Duration::from_millis(settings.request_timeout_ms),
        )
    }

    /// Base URL of `tenant`'s content service.
    pub fn endpoint(&self, tenant: &str) -> String {
        self.url_template
            .replace(NAMESPACE_PLACEHOLDER, tenant)
            .trim_end_matches('/')
            .to_string()
    }

    /// Write `data` to `path`, creating parent directories.
    #[instrument(skip(self, token, data), fields(size = data.len()))]
    pub async fn write(&self, token: &str, tenant: &str, path: &str, data: &[u8]) -> ContentResult<()> {
        let path = normalize_path(path)?;
        let body = match std::str::from_utf8(data) {
            Ok(text) => WriteRequest {
                path: path.clone(),
                content: text.to_string(),
                encoding: Encoding::Utf8,
            },
            Err(_) => WriteRequest {
                path: path.clone(),
                content: STANDARD.encode(data),
                encoding: Encoding::Base64,
            },
        };
        let url = format!("{}/content/write", self.endpoint(tenant));
        let _ = self.send(token, self.client.post(url).json(&body), &path).await?;
        debug!(tenant, path = %path, "content written");
        Ok(())
    }

    /// Read the file at `path`.
    #[instrument(skip(self, token))]
    pub async fn read(&self, token: &str, tenant: &str, path: &str) -> ContentResult<Vec<u8>> {
        let path = normalize_path(path)?;
        let url = format!("{}/content/file", self.endpoint(tenant));
        let request = self.client.get(url).query(&PathQuery { path: path.clone() });
        let response = self.send(token, request, &path).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// List the directory at `path`.
    #[instrument(skip(self, token))]
    pub async fn list(&self, token: &str, tenant: &str, path: &str) -> ContentResult<Vec<ContentEntry>> {
        let path = normalize_path(path)?;
        let url = format!("{}/content/list", self.endpoint(tenant));
        let request = self.client.get(url).query(&PathQuery { path: path.clone() });
        let response = self.send(token, request, &path).await?;
        Ok(response.json().await?)
    }

    /// Whether a file exists at `path`.
    #[instrument(skip(self, token))]
    pub async fn exists(&self, token: &str, tenant: &str, path: &str) -> ContentResult<bool> {
        let path = normalize_path(path)?;
        let url = format!("{}/content/file", self.endpoint(tenant));
        let request = self.client.head(url).query(&PathQuery { path: path.clone() });
        match self.send(token, request, &path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn send(&self, token: &str, request: RequestBuilder, path: &str) -> ContentResult<Response> {
        if token.trim().is_empty() {
            return Err(ContentError::MissingCredential);
        }
        let response = request.bearer_auth(token).timeout(self.timeout).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/error/message")?.as_str().map(String::from))
            .unwrap_or(body);
        Err(ContentError::from_status(status.as_u16(), path, message))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn proxy(server: &MockServer) -> ContentProxy {
        ContentProxy::new(format!("{}/t/{{namespace}}", server.uri()), Duration::from_secs(5))
    }

    #[test]
    fn endpoint_substitutes_tenant() {
        let p = ContentProxy::new("http://content.{namespace}.svc:8080/", Duration::from_secs(1));
        assert_eq!(p.endpoint("team-a"), "http://content.team-a.svc:8080");
    }

    #[tokio::test]
    async fn write_forwards_caller_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t/team/content/write"))
            .and(header("authorization", "Bearer caller-token"))
            .and(body_json(json!({
                "path": "/sessions/s1/result.md",
                "content": "done",
                "encoding": "utf8"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"path": "/sessions/s1/result.md", "size": 4})))
            .expect(1)
            .mount(&server)
            .await;

        proxy(&server)
            .write("caller-token", "team", "sessions//s1/./result.md", b"done")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn binary_writes_use_base64() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t/team/content/write"))
            .and(body_json(json!({"path": "/blob", "content": "/w==", "encoding": "base64"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"path": "/blob", "size": 2})))
            .expect(1)
            .mount(&server)
            .await;
        proxy(&server).write("t", "team", "/blob", &[0xff, 0xf0]).await.unwrap();
    }

    #[tokio::test]
    async fn traversal_never_leaves_the_process() {
        let server = MockServer::start().await;
        let result = proxy(&server).read("t", "team", "/a/../../etc/passwd").await;
        assert_matches!(result, Err(ContentError::InvalidPath(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_refused() {
        let server = MockServer::start().await;
        assert_matches!(
            proxy(&server).list("", "team", "/").await,
            Err(ContentError::MissingCredential)
        );
    }

    #[tokio::test]
    async fn read_maps_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/t/team/content/file"))
            .and(query_param("path", "/missing.md"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "NOT_FOUND", "message": "'/missing.md' not found"}
            })))
            .mount(&server)
            .await;
        let err = proxy(&server).read("t", "team", "missing.md").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_parses_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/t/team/content/list"))
            .and(query_param("path", "/workflows/wf/workspace"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "plan.md", "path": "/workflows/wf/workspace/plan.md", "isDir": false, "size": 12}
            ])))
            .mount(&server)
            .await;
        let entries = proxy(&server)
            .list("t", "team", "/workflows/wf/workspace/")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "plan.md");
        assert!(!entries[0].is_dir);
    }

    #[tokio::test]
    async fn exists_uses_head() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/t/team/content/file"))
            .and(query_param("path", "/spec.md"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/t/team/content/file"))
            .and(query_param("path", "/plan.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let p = proxy(&server);
        assert!(p.exists("t", "team", "spec.md").await.unwrap());
        assert!(!p.exists("t", "team", "plan.md").await.unwrap());
    }

    #[tokio::test]
    async fn upstream_failures_surface() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/t/team/content/file"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        assert_matches!(
            proxy(&server).read("t", "team", "/x").await,
            Err(ContentError::Upstream { status: 500, message }) if message == "boom"
        );
    }
}

//! Content service: serves one tenant's workspace root over HTTP.
//!
//! Routes:
//! - `POST /content/write`: `{path, content, encoding}`
//! - `GET|HEAD /content/file?path=`: raw bytes
//! - `GET /content/list?path=`: `[ContentEntry]`
//! - `GET /health`
//!
//! Every `/content` route requires a bearer credential. Paths are normalized
//! with [`normalize_path`] and then resolved against the real root, so a
//! symlink inside the root cannot lead outside it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ambient_core::ValidationError;
use ambient_settings::ContentSettings;
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::path::{join_under, normalize_path, resolve_under};
use crate::types::{ContentEntry, Encoding, PathQuery, WriteRequest, WriteResponse};

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct ContentServiceState {
    root: Arc<PathBuf>,
    max_write_bytes: usize,
}

impl ContentServiceState {
    /// State serving `root`, refusing writes above `max_write_bytes`.
    pub fn new(root: impl Into<PathBuf>, max_write_bytes: usize) -> Self {
        Self {
            root: Arc::new(root.into()),
            max_write_bytes,
        }
    }

    /// State from settings.
    pub fn from_settings(settings: &ContentSettings) -> Self {
        Self::new(&settings.root, settings.max_write_bytes)
    }

    /// Normalize `raw` and resolve it below the root, refusing escapes.
    async fn resolve(&self, raw: &str) -> Result<(String, PathBuf), ServiceError> {
        let normalized = normalize_path(raw)?;
        let target = resolve_under(&self.root, &normalized);
        let root = tokio::fs::canonicalize(&*self.root).await?;
        // walk up to the deepest existing ancestor; that is what a symlink could redirect
        let mut ancestor = target.clone();
        loop {
            match tokio::fs::canonicalize(&ancestor).await {
                Ok(real) if real.starts_with(&root) => return Ok((normalized, target)),
                Ok(_) => {
                    warn!(path = %normalized, "path resolves outside the content root");
                    return Err(ServiceError::InvalidPath(ValidationError::InvalidPath {
                        path: normalized,
                        reason: "resolves outside the content root".into(),
                    }));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if !ancestor.pop() {
                        return Err(ServiceError::Io(e));
                    }
                }
                Err(e) => return Err(ServiceError::Io(e)),
            }
        }
    }
}

/// Build the content router.
pub fn router(state: ContentServiceState) -> Router {
    let body_limit = state.max_write_bytes.saturating_mul(2).max(64 * 1024);
    let content = Router::new()
        .route("/content/write", post(write_file))
        .route("/content/file", get(read_file))
        .route("/content/list", get(list_dir))
        .route_layer(middleware::from_fn(require_bearer))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .merge(content)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `settings.root` until `shutdown` is cancelled.
pub async fn serve(settings: &ContentSettings, shutdown: CancellationToken) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&settings.root).await?;
    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!(addr = %listener.local_addr()?, root = %settings.root, "content service listening");
    axum::serve(listener, router(ContentServiceState::from_settings(settings)))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ServiceError {
    Unauthenticated,
    InvalidPath(ValidationError),
    BadRequest(String),
    NotFound(String),
    TooLarge { size: usize, limit: usize },
    Io(std::io::Error),
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidPath(e)
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "bearer credential required".to_string(),
            ),
            Self::InvalidPath(e) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", e.to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", message),
            Self::NotFound(path) => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("'{path}' not found")),
            Self::TooLarge { size, limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "INVALID_REQUEST",
                format!("payload of {size} bytes exceeds the {limit} byte limit"),
            ),
            Self::Io(e) => {
                error!(error = %e, "content io failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({"error": {"code": code, "message": message}}))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn require_bearer(request: Request, next: Next) -> Response {
    let has_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| !t.trim().is_empty());
    if has_token {
        next.run(request).await
    } else {
        ServiceError::Unauthenticated.into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn write_file(
    State(state): State<ContentServiceState>,
    Json(body): Json<WriteRequest>,
) -> Result<Json<WriteResponse>, ServiceError> {
    let data = match body.encoding {
        Encoding::Utf8 => body.content.into_bytes(),
        Encoding::Base64 => STANDARD
            .decode(body.content.as_bytes())
            .map_err(|e| ServiceError::BadRequest(format!("invalid base64 content: {e}")))?,
    };
    if data.len() > state.max_write_bytes {
        return Err(ServiceError::TooLarge {
            size: data.len(),
            limit: state.max_write_bytes,
        });
    }
    let (normalized, target) = state.resolve(&body.path).await?;
    if normalized == "/" {
        return Err(ServiceError::BadRequest("cannot write to the root".into()));
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::metadata(&target).await.is_ok_and(|m| m.is_dir()) {
        return Err(ServiceError::BadRequest(format!("'{normalized}' is a directory")));
    }
    tokio::fs::write(&target, &data).await?;
    debug!(path = %normalized, size = data.len(), "wrote file");
    Ok(Json(WriteResponse {
        path: normalized,
        size: data.len() as u64,
    }))
}

async fn read_file(
    State(state): State<ContentServiceState>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ServiceError> {
    let (normalized, target) = state.resolve(&query.path).await?;
    let metadata = metadata_or_not_found(&target, &normalized).await?;
    if metadata.is_dir() {
        return Err(ServiceError::BadRequest(format!("'{normalized}' is a directory")));
    }
    let data = tokio::fs::read(&target).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response())
}

async fn list_dir(
    State(state): State<ContentServiceState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Vec<ContentEntry>>, ServiceError> {
    let (normalized, target) = state.resolve(&query.path).await?;
    let metadata = metadata_or_not_found(&target, &normalized).await?;
    if !metadata.is_dir() {
        return Err(ServiceError::BadRequest(format!("'{normalized}' is not a directory")));
    }

    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(&target).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let Ok(path) = join_under(&normalized, &name) else {
            continue;
        };
        entries.push(ContentEntry {
            name,
            path,
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified_at: meta.modified().ok().map(Into::into),
        });
    }
    // directories first, then by name
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(Json(entries))
}

async fn metadata_or_not_found(target: &Path, normalized: &str) -> Result<std::fs::Metadata, ServiceError> {
    match tokio::fs::metadata(target).await {
        Ok(m) => Ok(m),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ServiceError::NotFound(normalized.to_string())),
        Err(e) => Err(ServiceError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn app(root: &Path) -> Router {
        router(ContentServiceState::new(root, 1024))
    }

    fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer t")
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn write_body(path: &str, content: &str) -> Body {
        Body::from(json!({"path": path, "content": content}).to_string())
    }

    #[tokio::test]
    async fn health_needs_no_credential() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn content_routes_require_bearer() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/content/list?path=/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn write_creates_parents_and_read_returns_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(dir.path());
        let resp = router
            .clone()
            .oneshot(authed("POST", "/content/write", write_body("sessions/s1/result.md", "# done")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["path"], "/sessions/s1/result.md");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sessions/s1/result.md")).unwrap(),
            "# done"
        );

        let resp = router
            .oneshot(authed("GET", "/content/file?path=/sessions/s1/result.md", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"# done");
    }

    #[tokio::test]
    async fn base64_writes_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let body = Body::from(json!({"path": "/bin", "content": "/w==", "encoding": "base64"}).to_string());
        let resp = app(dir.path()).oneshot(authed("POST", "/content/write", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(std::fs::read(dir.path().join("bin")).unwrap(), vec![0xff]);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(authed("GET", "/content/file?path=../../etc/passwd", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], "INVALID_REQUEST");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let resp = app(dir.path())
            .oneshot(authed("GET", "/content/file?path=/link/secret", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(authed("GET", "/content/file?path=/nope.md", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_write_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let big = "x".repeat(2048);
        let resp = app(dir.path())
            .oneshot(authed("POST", "/content/write", write_body("/big", &big)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!dir.path().join("big").exists());
    }

    #[tokio::test]
    async fn list_orders_directories_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ws/sub")).unwrap();
        std::fs::write(dir.path().join("ws/a.md"), "aa").unwrap();
        let resp = app(dir.path())
            .oneshot(authed("GET", "/content/list?path=ws", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let entries: Vec<ContentEntry> = serde_json::from_value(body_json(resp).await).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "sub");
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].path, "/ws/a.md");
        assert_eq!(entries[1].size, 2);
    }

    #[tokio::test]
    async fn reading_a_directory_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("d")).unwrap();
        let resp = app(dir.path())
            .oneshot(authed("GET", "/content/file?path=d", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

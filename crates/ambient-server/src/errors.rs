//! API errors and their HTTP mapping.
//!
//! Every failure leaves the server as `{"error": {"code", "message"}}`.
//! Internal failures are logged in full and answered with a fixed message.

use ambient_auth::AuthError;
use ambient_cluster::ClusterError;
use ambient_content::ContentError;
use ambient_controller::ControllerError;
use ambient_core::ValidationError;
use ambient_tenancy::TenancyError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::{error, warn};

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// A request failure, classified for the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed body, bad name or rejected path.
    #[error("{0}")]
    InvalidRequest(String),

    /// No usable credential.
    #[error("{0}")]
    Unauthenticated(String),

    /// The caller may not do this.
    #[error("{0}")]
    Forbidden(String),

    /// Missing, or not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Illegal lifecycle transition, name collision or lost update.
    #[error("{0}")]
    Conflict(String),

    /// The content service or the cluster API failed.
    #[error("{0}")]
    Upstream(String),

    /// Anything else. The message is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for [`ApiError::NotFound`].
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                error!(error = %detail, "internal error");
                "internal server error".to_string()
            }
            Self::Upstream(detail) => {
                warn!(error = %detail, "upstream failure");
                detail.clone()
            }
            other => other.to_string(),
        };
        let body = json!({ "error": { "code": self.code(), "message": message } });
        (status, Json(body)).into_response()
    }
}

impl From<ClusterError> for ApiError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotFound { .. } => Self::NotFound(e.to_string()),
            ClusterError::AlreadyExists { .. } | ClusterError::Conflict { .. } => Self::Conflict(e.to_string()),
            ClusterError::Forbidden { .. } => Self::Forbidden(e.to_string()),
            ClusterError::Unauthorized { .. } => Self::Unauthenticated(e.to_string()),
            ClusterError::Invalid { .. } => Self::InvalidRequest(e.to_string()),
            ClusterError::Http(_) | ClusterError::Api { .. } | ClusterError::Watch { .. } => {
                Self::Upstream(format!("cluster API failure: {e}"))
            }
            ClusterError::Json(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated => Self::Unauthenticated(e.to_string()),
            AuthError::Forbidden { .. } => Self::Forbidden(e.to_string()),
            AuthError::Cluster(inner) => inner.into(),
        }
    }
}

impl From<TenancyError> for ApiError {
    fn from(e: TenancyError) -> Self {
        match e {
            TenancyError::Validation(v) => v.into(),
            TenancyError::NotFound(what) => Self::not_found(what),
            TenancyError::AlreadyExists(_) => Self::Conflict(e.to_string()),
            TenancyError::Cluster(inner) => inner.into(),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::InvalidPath(v) => v.into(),
            ContentError::NotFound { .. } => Self::NotFound(e.to_string()),
            ContentError::MissingCredential | ContentError::Unauthorized => Self::Unauthenticated(e.to_string()),
            ContentError::Rejected { .. } => Self::InvalidRequest(e.to_string()),
            ContentError::Upstream { .. } | ContentError::Http(_) => Self::Upstream(e.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

impl From<ControllerError> for ApiError {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::Cluster(inner) => inner.into(),
            ControllerError::StatusConflict { .. } => Self::Conflict(e.to_string()),
            ControllerError::Encode(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("JSON encoding failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn conflict_body_shape() {
        let (status, body) = body_of(ApiError::Conflict("session s1 is Running".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["message"], "session s1 is Running");
    }

    #[tokio::test]
    async fn internal_errors_are_sanitized() {
        let (status, body) = body_of(ApiError::Internal("token=abc leaked".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "internal server error");
    }

    #[test]
    fn cluster_errors_classified() {
        assert_eq!(ApiError::from(ClusterError::not_found("jobs", "j")).status(), StatusCode::NOT_FOUND);
        let exists = ClusterError::AlreadyExists {
            kind: "agenticsessions".into(),
            name: "s".into(),
        };
        assert_eq!(ApiError::from(exists).code(), "CONFLICT");
        let denied = ClusterError::Forbidden { message: "no".into() };
        assert_eq!(ApiError::from(denied).status(), StatusCode::FORBIDDEN);
        let down = ClusterError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(ApiError::from(down).code(), "UPSTREAM_ERROR");
    }

    #[test]
    fn validation_and_content_errors_classified() {
        assert_eq!(
            ApiError::from(ValidationError::missing("prompt")).status(),
            StatusCode::BAD_REQUEST
        );
        let missing = ContentError::NotFound { path: "/a".into() };
        assert_eq!(ApiError::from(missing).status(), StatusCode::NOT_FOUND);
        let upstream = ContentError::Upstream {
            status: 500,
            message: "disk".into(),
        };
        assert_eq!(ApiError::from(upstream).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn auth_and_tenancy_errors_classified() {
        assert_eq!(ApiError::from(AuthError::Unauthenticated).code(), "UNAUTHENTICATED");
        let forbidden = AuthError::Forbidden {
            verb: "create".into(),
            resource: "agenticsessions".into(),
        };
        assert_eq!(ApiError::from(forbidden).code(), "FORBIDDEN");
        let gone = TenancyError::NotFound("project 'x'".into());
        let err = ApiError::from(gone);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "project 'x' not found");
    }
}

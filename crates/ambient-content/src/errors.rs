//! Content errors.

use ambient_core::ValidationError;
use thiserror::Error;

/// Result alias for content operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// Errors from the content proxy.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The path was rejected before any request was made.
    #[error(transparent)]
    InvalidPath(#[from] ValidationError),

    /// No caller credential was available to forward.
    #[error("no caller credential to forward to the content service")]
    MissingCredential,

    /// The file or directory does not exist.
    #[error("'{path}' not found")]
    NotFound {
        /// Normalized path.
        path: String,
    },

    /// The content service refused the forwarded credential.
    #[error("content service rejected the credential")]
    Unauthorized,

    /// The content service rejected the request as invalid.
    #[error("content service rejected the request: {message}")]
    Rejected {
        /// Reason given by the service.
        message: String,
    },

    /// Any other non-success status from the content service.
    #[error("content service returned {status}: {message}")]
    Upstream {
        /// HTTP status.
        status: u16,
        /// Body or reason.
        message: String,
    },

    /// Transport failure.
    #[error("content service unreachable: {0}")]
    Http(#[from] reqwest::Error),
}

impl ContentError {
    /// Map a non-success response to an error.
    pub fn from_status(status: u16, path: &str, message: String) -> Self {
        match status {
            404 => Self::NotFound {
                path: path.to_string(),
            },
            401 | 403 => Self::Unauthorized,
            400 | 413 | 422 => Self::Rejected { message },
            _ => Self::Upstream { status, message },
        }
    }

    /// Whether this is [`ContentError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ContentError::from_status(404, "/a", String::new()).is_not_found());
        assert!(matches!(
            ContentError::from_status(401, "/a", String::new()),
            ContentError::Unauthorized
        ));
        assert!(matches!(
            ContentError::from_status(413, "/a", "too big".into()),
            ContentError::Rejected { .. }
        ));
        assert!(matches!(
            ContentError::from_status(503, "/a", "down".into()),
            ContentError::Upstream { status: 503, .. }
        ));
    }
}

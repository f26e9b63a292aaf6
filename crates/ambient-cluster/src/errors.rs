//! Cluster store errors.

use thiserror::Error;

/// Result type alias for store operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors returned by an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind or plural of the object.
        kind: String,
        /// Object name.
        name: String,
    },

    /// An object with that name already exists.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind or plural of the object.
        kind: String,
        /// Object name.
        name: String,
    },

    /// Optimistic concurrency failure (stale `resourceVersion`).
    #[error("conflict on {kind} '{name}': {message}")]
    Conflict {
        /// Kind or plural of the object.
        kind: String,
        /// Object name.
        name: String,
        /// Server message.
        message: String,
    },

    /// The caller is authenticated but not allowed to do this.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Server message.
        message: String,
    },

    /// The caller's credential was rejected.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server message.
        message: String,
    },

    /// The request or object was malformed.
    #[error("invalid: {message}")]
    Invalid {
        /// Server message.
        message: String,
    },

    /// Transport failure talking to the API server.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other non-success status from the API server.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server message.
        message: String,
    },

    /// Marshal/unmarshal failure at the typed boundary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The watch stream broke or reported an error event.
    #[error("watch error: {message}")]
    Watch {
        /// Description.
        message: String,
    },
}

impl ClusterError {
    /// Classify an API server status code.
    pub fn from_status(status: u16, kind: &str, name: &str, message: String) -> Self {
        match status {
            401 => Self::Unauthorized { message },
            403 => Self::Forbidden { message },
            404 => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            409 if message.contains("already exists") => Self::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            409 => Self::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message,
            },
            400 | 422 => Self::Invalid { message },
            _ => Self::Api { status, message },
        }
    }

    /// Shorthand for [`ClusterError::NotFound`].
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether the object was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the name was taken.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether a write lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Conflict { .. } | Self::Watch { .. } => true,
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::Forbidden { .. }
            | Self::Unauthorized { .. }
            | Self::Invalid { .. }
            | Self::Json(_) => false,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Conflict { .. } => "conflict",
            Self::Forbidden { .. } => "forbidden",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Invalid { .. } => "invalid",
            Self::Http(_) | Self::Api { .. } | Self::Watch { .. } => "transport",
            Self::Json(_) => "serde",
        }
    }
}

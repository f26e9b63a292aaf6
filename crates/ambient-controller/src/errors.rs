//! Controller errors.

use ambient_cluster::ClusterError;

/// Result alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors raised while reconciling or supervising a session.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Store call failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The runner environment could not be encoded.
    #[error("failed to encode runner environment: {0}")]
    Encode(#[from] serde_json::Error),

    /// Every status write attempt hit a conflict.
    #[error("status of {name} still conflicting after {attempts} attempts")]
    StatusConflict {
        /// Session name.
        name: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl ControllerError {
    /// Whether retrying on the next event or tick may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cluster(e) => e.is_retryable(),
            Self::StatusConflict { .. } => true,
            Self::Encode(_) => false,
        }
    }
}

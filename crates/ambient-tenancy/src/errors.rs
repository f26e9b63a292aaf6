//! Tenancy errors.

use ambient_cluster::ClusterError;
use ambient_core::ValidationError;

/// Result alias for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Errors from project, permission and access-key operations.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    /// The request was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The project, grant or key does not exist or is not visible.
    #[error("{0} not found")]
    NotFound(String),

    /// The object already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Store failure.
    #[error(transparent)]
    Cluster(ClusterError),
}

impl From<ClusterError> for TenancyError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::AlreadyExists { kind, name } => Self::AlreadyExists(format!("{kind} '{name}'")),
            other => Self::Cluster(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_is_lifted() {
        let err = TenancyError::from(ClusterError::AlreadyExists {
            kind: "namespaces".into(),
            name: "team".into(),
        });
        assert_eq!(err.to_string(), "namespaces 'team' already exists");
    }

    #[test]
    fn other_cluster_errors_wrap() {
        let err = TenancyError::from(ClusterError::not_found("rolebindings", "x"));
        assert!(matches!(err, TenancyError::Cluster(_)));
    }
}

//! Auth error types.

use ambient_cluster::ClusterError;

/// Errors from identity resolution and access review.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer credential on the request.
    #[error("authentication required")]
    Unauthenticated,

    /// The access review denied the action.
    #[error("forbidden: cannot {verb} {resource}")]
    Forbidden {
        /// Verb that was denied.
        verb: String,
        /// `resource` or `resource/subresource`.
        resource: String,
    },

    /// The cluster rejected or failed the review itself.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_display() {
        let err = AuthError::Forbidden {
            verb: "delete".into(),
            resource: "agenticsessions".into(),
        };
        assert_eq!(err.to_string(), "forbidden: cannot delete agenticsessions");
    }

    #[test]
    fn cluster_errors_pass_through() {
        let err = AuthError::from(ClusterError::not_found("namespaces", "x"));
        assert!(err.to_string().contains("not found"));
    }
}

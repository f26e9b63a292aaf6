//! Access review against the caller's own identity.

use ambient_cluster::{AccessCheck, ObjectStore};
use tracing::debug;

use crate::errors::AuthError;

/// Require that the store's identity may perform `check`.
pub async fn authorize(store: &dyn ObjectStore, check: &AccessCheck) -> Result<(), AuthError> {
    if store.review_access(check).await? {
        Ok(())
    } else {
        debug!(
            verb = %check.verb,
            resource = %check.resource_path(),
            namespace = check.namespace.as_deref().unwrap_or_default(),
            "access review denied"
        );
        Err(AuthError::Forbidden {
            verb: check.verb.clone(),
            resource: check.resource_path(),
        })
    }
}

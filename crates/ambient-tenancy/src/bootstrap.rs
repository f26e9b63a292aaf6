//! Cluster-wide objects every project depends on.

use std::sync::Arc;

use ambient_cluster::objects::{ClusterRole, project_cluster_roles};
use ambient_cluster::{Api, ObjectStore};
use tracing::info;

use crate::errors::TenancyResult;

/// Create or refresh the `ambient-project-{admin,edit,view}` cluster roles.
pub async fn ensure_cluster_roles(service: Arc<dyn ObjectStore>) -> TenancyResult<()> {
    let roles = Api::<ClusterRole>::all(service);
    for desired in project_cluster_roles() {
        let name = desired.metadata.name.clone();
        match roles.get_opt(&name).await? {
            None => {
                let _ = roles.create(&desired).await?;
                info!(role = %name, "created project cluster role");
            }
            Some(mut existing) if existing.rules != desired.rules => {
                existing.rules = desired.rules;
                let _ = roles.replace(&existing).await?;
                info!(role = %name, "updated project cluster role");
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ambient_cluster::{ClusterConnector, InMemoryCluster, ListParams};

    use super::*;

    #[tokio::test]
    async fn creates_then_repairs_roles() {
        let cluster = InMemoryCluster::new();
        ensure_cluster_roles(cluster.service()).await.unwrap();
        let roles = Api::<ClusterRole>::all(cluster.service());
        assert_eq!(roles.list(&ListParams::default()).await.unwrap().len(), 3);

        let mut edit = roles.get("ambient-project-edit").await.unwrap();
        edit.rules.clear();
        let _ = roles.replace(&edit).await.unwrap();
        ensure_cluster_roles(cluster.service()).await.unwrap();
        assert!(!roles.get("ambient-project-edit").await.unwrap().rules.is_empty());
    }
}

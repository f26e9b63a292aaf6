//! Shared handler state.

use std::sync::Arc;
use std::time::Instant;

use ambient_auth::CredentialProvisioner;
use ambient_cluster::{ClusterConnector, ObjectStore};
use ambient_content::ContentProxy;
use ambient_settings::AmbientSettings;

/// State cloned into every handler. Holds no per-caller data.
#[derive(Clone)]
pub struct AppState {
    /// Source of service and caller-scoped stores.
    pub connector: Arc<dyn ClusterConnector>,
    /// Loaded settings.
    pub settings: Arc<AmbientSettings>,
    /// Tenant content client.
    pub content: ContentProxy,
    /// Per-session runner identity provisioner.
    pub provisioner: CredentialProvisioner,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// State for `connector` configured from `settings`.
    pub fn new(connector: Arc<dyn ClusterConnector>, settings: AmbientSettings) -> Self {
        Self {
            content: ContentProxy::from_settings(&settings.content),
            provisioner: CredentialProvisioner::new(settings.credentials.token_ttl_secs),
            connector,
            settings: Arc::new(settings),
            start_time: Instant::now(),
        }
    }

    /// Store acting as the service identity.
    pub fn service(&self) -> Arc<dyn ObjectStore> {
        self.connector.service()
    }
}

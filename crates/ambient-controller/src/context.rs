//! Shared state of the controller and its supervision tasks.

use std::sync::Arc;
use std::time::Duration;

use ambient_cluster::{Api, ObjectStore};
use ambient_core::resources::AgenticSession;
use ambient_settings::{AmbientSettings, ControllerSettings};
use tokio_util::sync::CancellationToken;

use crate::supervisor::SupervisorRegistry;

/// Store handle, settings and task bookkeeping, cloned into every task.
#[derive(Clone)]
pub struct ControllerContext {
    /// Store acting as the service identity.
    pub service: Arc<dyn ObjectStore>,
    /// Controller settings.
    pub settings: Arc<ControllerSettings>,
    /// Callback URL handed to runners.
    pub backend_api_url: Arc<str>,
    /// Running supervision tasks.
    pub supervisors: Arc<SupervisorRegistry>,
    /// Cancelled when the controller shuts down.
    pub shutdown: CancellationToken,
}

impl ControllerContext {
    /// Context for `service` configured from `settings`.
    pub fn new(service: Arc<dyn ObjectStore>, settings: &AmbientSettings, shutdown: CancellationToken) -> Self {
        Self {
            service,
            settings: Arc::new(settings.controller.clone()),
            backend_api_url: Arc::from(settings.server.backend_api_url.as_str()),
            supervisors: Arc::new(SupervisorRegistry::new()),
            shutdown,
        }
    }

    /// Sessions in `namespace`.
    pub fn sessions(&self, namespace: &str) -> Api<AgenticSession> {
        Api::namespaced(Arc::clone(&self.service), namespace)
    }

    /// Supervision poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings.poll_interval_ms)
    }

    /// Pause before resubscribing to the session watch.
    pub fn watch_backoff(&self) -> Duration {
        Duration::from_millis(self.settings.watch_backoff_ms)
    }
}

//! Process components and their shutdown.
//!
//! The API listener, the controller and the content service run as named
//! components under one [`ShutdownCoordinator`]. A component that fails
//! takes the whole process down; on shutdown every component gets the same
//! drain deadline and the ones still running at the deadline are aborted.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drain time when none is configured.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct Component {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns the process shutdown token and the running components.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    components: Vec<Component>,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh token and no components.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            components: Vec::new(),
        }
    }

    /// Handle to the shared token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every holder of the token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Names of the components started so far.
    pub fn components(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name).collect()
    }

    /// Run `task` as component `name`. An error is logged and cancels the
    /// shared token.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            match task.await {
                Ok(()) => debug!(component = name, "component stopped"),
                Err(e) => {
                    error!(component = name, error = %e, "component failed");
                    token.cancel();
                }
            }
        });
        self.track(name, handle);
    }

    /// Drain an already spawned task as component `name`.
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        info!(component = name, "component started");
        self.components.push(Component { name, handle });
    }

    /// Cancel the token, then wait until `timeout` for every component.
    ///
    /// Returns the components that were still running at the deadline; they
    /// are aborted.
    pub async fn graceful_shutdown(self, timeout: Option<Duration>) -> Vec<&'static str> {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.token.cancel();
        info!(
            components = self.components.len(),
            timeout_secs = timeout.as_secs(),
            "draining components"
        );
        let deadline = Instant::now() + timeout;
        let mut aborted = Vec::new();
        for Component { name, mut handle } in self.components {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(component = name, error = %e, "component panicked"),
                Err(_) => {
                    handle.abort();
                    aborted.push(name);
                }
            }
        }
        if !aborted.is_empty() {
            warn!(?aborted, "shutdown timed out after {timeout:?}, components aborted");
        }
        aborted
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_and_empty() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(coord.components().is_empty());
    }

    #[test]
    fn shutdown_reaches_every_token() {
        let coord = ShutdownCoordinator::default();
        let a = coord.token();
        let b = coord.token();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[tokio::test]
    async fn failed_component_stops_the_process() {
        let mut coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.spawn("content", async { Err(io::Error::other("address in use")) });
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
        assert_eq!(coord.graceful_shutdown(None).await, Vec::<&str>::new());
    }

    #[tokio::test]
    async fn drains_components_that_honor_the_token() {
        let mut coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.spawn("api", async move {
            token.cancelled().await;
            Ok(())
        });
        let token = coord.token();
        coord.track("controller", tokio::spawn(async move { token.cancelled().await }));
        assert_eq!(coord.components(), vec!["api", "controller"]);
        assert!(coord.graceful_shutdown(None).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_components_past_the_deadline() {
        let mut coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("api", tokio::spawn(async move { token.cancelled().await }));
        coord.track(
            "controller",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(300)).await;
            }),
        );
        let aborted = coord.graceful_shutdown(Some(Duration::from_millis(100))).await;
        assert_eq!(aborted, vec!["controller"]);
    }
}

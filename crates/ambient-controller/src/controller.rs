//! The session watch loop.

use ambient_cluster::{Api, WatchEvent};
use ambient_core::resources::AgenticSession;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::context::ControllerContext;
use crate::errors::ControllerResult;
use crate::reconcile::reconcile;

/// Watches sessions and reconciles every change until shutdown.
pub struct Controller {
    ctx: ControllerContext,
}

impl Controller {
    /// Controller over `ctx`.
    pub fn new(ctx: ControllerContext) -> Self {
        Self { ctx }
    }

    /// Shared context.
    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    /// Run until the shutdown token is cancelled. A watch that ends or fails
    /// is resubscribed after the configured backoff.
    pub async fn run(self) {
        let scope = self.ctx.settings.namespace.as_deref().unwrap_or("<all>");
        info!(namespace = scope, "controller started");
        loop {
            match self.watch_once().await {
                Ok(()) => debug!("session watch ended"),
                Err(e) => warn!(error = %e, "session watch failed"),
            }
            tokio::select! {
                () = self.ctx.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.ctx.watch_backoff()) => {}
            }
        }
        self.ctx.supervisors.cancel_all();
        info!("controller stopped");
    }

    async fn watch_once(&self) -> ControllerResult<()> {
        let api = match &self.ctx.settings.namespace {
            Some(namespace) => self.ctx.sessions(namespace),
            None => Api::<AgenticSession>::all(self.ctx.service.clone()),
        };
        let mut events = api.watch().await?;
        loop {
            let next = tokio::select! {
                () = self.ctx.shutdown.cancelled() => return Ok(()),
                next = events.next() => next,
            };
            match next {
                Some(event) => self.handle(event?).await,
                None => return Ok(()),
            }
        }
    }

    async fn handle(&self, event: WatchEvent<AgenticSession>) {
        match event {
            WatchEvent::Added(session) | WatchEvent::Modified(session) => {
                let namespace = session.metadata.namespace_or_empty();
                let name = &session.metadata.name;
                if let Err(e) = reconcile(&self.ctx, namespace, name).await {
                    warn!(namespace, session = %name, error = %e, "reconcile failed");
                }
            }
            WatchEvent::Deleted(session) => {
                let namespace = session.metadata.namespace_or_empty();
                if self.ctx.supervisors.cancel(namespace, &session.metadata.name) {
                    info!(namespace, session = %session.metadata.name, "session deleted, supervision stopped");
                }
            }
        }
    }
}

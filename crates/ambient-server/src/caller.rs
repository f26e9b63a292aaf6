//! Caller resolution and project access checks.
//!
//! [`require_caller`] runs in front of every `/api` route. It turns the
//! request's bearer credential into a [`Caller`] whose store acts as that
//! credential; handlers never fall back to the service identity for
//! caller-visible reads and writes.

use std::sync::Arc;

use ambient_auth::{CallerCredential, authorize};
use ambient_cluster::objects::Namespace;
use ambient_cluster::{AccessCheck, Api, ObjectStore};
use ambient_core::Resource;
use ambient_core::constants::LABEL_MANAGED;
use ambient_tenancy::{access_keys, projects};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

/// The authenticated caller of one request.
#[derive(Clone)]
pub struct Caller {
    /// Credential and forwarded identity context.
    pub credential: CallerCredential,
    /// Store acting as the credential.
    pub store: Arc<dyn ObjectStore>,
}

impl Caller {
    /// Bearer token forwarded to the content service.
    pub fn token(&self) -> &str {
        &self.credential.token
    }

    /// Typed access to `K` in `project` as the caller.
    pub fn api<K: Resource>(&self, project: &str) -> Api<K> {
        Api::namespaced(Arc::clone(&self.store), project)
    }

    /// Name recorded as the author of caller actions.
    pub fn display_user(&self) -> Option<&str> {
        self.credential.forwarded_user.as_deref()
    }
}

/// Middleware: resolve the caller or answer 401.
///
/// After a successful response, a caller holding an access-key token has
/// the key's last-used time refreshed.
pub async fn require_caller(State(state): State<AppState>, mut request: Request, next: Next) -> ApiResult<Response> {
    let credential = CallerCredential::from_headers(request.headers())?;
    let caller = Caller {
        store: state.connector.for_token(&credential.token),
        credential,
    };
    let key_account = state
        .settings
        .credentials
        .track_key_usage
        .then(|| caller.credential.service_account())
        .flatten();
    let _ = request.extensions_mut().insert(caller);

    let response = next.run(request).await;
    if let Some((namespace, account)) = key_account {
        if response.status().is_success() {
            match access_keys::touch_last_used(state.service(), &namespace, &account).await {
                Ok(updated) => debug!(namespace, account, updated, "access key use recorded"),
                Err(e) => warn!(namespace, account, error = %e, "failed to record access key use"),
            }
        }
    }
    Ok(response)
}

/// Require that `project` is visible to the caller and that the caller
/// passes `check` in it.
pub async fn authorize_project(state: &AppState, caller: &Caller, project: &str, check: &AccessCheck) -> ApiResult<()> {
    let _ = projects::ensure_accessible(state.service(), caller.store.as_ref(), project).await?;
    authorize(caller.store.as_ref(), check).await?;
    Ok(())
}

/// Require only that `project` is a managed namespace, then that the caller
/// passes `check`. Used by narrowly scoped identities (a session's runner)
/// that cannot list the project's sessions.
pub async fn authorize_scoped(state: &AppState, caller: &Caller, project: &str, check: &AccessCheck) -> ApiResult<()> {
    let managed = Api::<Namespace>::all(state.service())
        .get_opt(project)
        .await?
        .is_some_and(|ns| ns.metadata.label(LABEL_MANAGED) == Some("true"));
    if !managed {
        return Err(ApiError::not_found(format!("project '{project}'")));
    }
    authorize(caller.store.as_ref(), check).await?;
    Ok(())
}

/// `verb` on kind `K` in `project`, optionally for one object.
pub fn check<K: Resource>(project: &str, verb: &str, name: Option<&str>) -> AccessCheck {
    let check = AccessCheck::for_kind::<K>(project, verb);
    match name {
        Some(name) => check.named(name),
        None => check,
    }
}

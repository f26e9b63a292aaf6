//! Router assembly and the HTTP listener.

use std::io;

use axum::Router;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::caller::require_caller;
use crate::handlers::{content, lifecycle, projects, sessions, settings, tenancy, workflows};
use crate::health::{self, HealthResponse};
use crate::state::AppState;

const PROJECT: &str = "/api/projects/{project}";

fn at(suffix: &str) -> String {
    format!("{PROJECT}{suffix}")
}

fn cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

/// Every `/api` route, behind caller resolution, plus `/health`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/projects", get(projects::list).post(projects::create))
        .route(PROJECT, get(projects::get).put(projects::update).delete(projects::delete))
        .route(&at("/settings"), get(settings::get).put(settings::put))
        .route(
            &at("/permissions"),
            get(tenancy::list_permissions).post(tenancy::grant_permission),
        )
        .route(
            &at("/permissions/{subject_type}/{subject_name}"),
            delete(tenancy::revoke_permission),
        )
        .route(&at("/keys"), get(tenancy::list_keys).post(tenancy::create_key))
        .route(&at("/keys/{key_id}"), delete(tenancy::delete_key))
        .route(&at("/sessions"), get(sessions::list).post(sessions::create))
        .route(
            &at("/sessions/{name}"),
            get(sessions::get).put(sessions::update).delete(sessions::delete),
        )
        .route(&at("/sessions/{name}/start"), post(lifecycle::start))
        .route(&at("/sessions/{name}/stop"), post(lifecycle::stop))
        .route(&at("/sessions/{name}/clone"), post(lifecycle::clone))
        .route(&at("/sessions/{name}/status"), put(lifecycle::report_status))
        .route(
            &at("/sessions/{name}/messages"),
            get(content::list_messages).post(content::post_message),
        )
        .route(&at("/sessions/{name}/workspace"), get(content::list_session_workspace))
        .route(
            &at("/sessions/{name}/workspace/{*path}"),
            get(content::read_session_file).put(content::write_session_file),
        )
        .route(&at("/workflows"), get(workflows::list).post(workflows::create))
        .route(&at("/workflows/{id}"), get(workflows::get).delete(workflows::delete))
        .route(&at("/workflows/{id}/sessions"), get(workflows::sessions))
        .route(&at("/workflows/{id}/jira"), put(workflows::link_jira))
        .route(&at("/workflows/{id}/workspace"), get(content::list_workflow_workspace))
        .route(
            &at("/workflows/{id}/workspace/{*path}"),
            get(content::read_workflow_file).put(content::write_workflow_file),
        )
        .route_layer(from_fn_with_state(state.clone(), require_caller));

    let cors = cors(&state.settings.server.cors_origins);
    api.route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time))
}

/// Bind the configured address and serve until `shutdown` fires.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> io::Result<()> {
    let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve_on(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

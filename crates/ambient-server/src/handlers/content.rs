//! Workspace artifacts and the session inbox, served through the content
//! proxy with the caller's own credential.

use ambient_content::path::join_under;
use ambient_content::{ContentEntry, session_path};
use ambient_controller::job::workspace_path;
use ambient_core::resources::{AgenticSession, Workflow};
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Items;
use super::workflows::workspace_root;
use crate::caller::{Caller, authorize_project, check};
use crate::errors::ApiResult;
use crate::state::AppState;

/// One inbox entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    /// Message text.
    pub content: String,
    /// Who sent it, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// When it was appended.
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /sessions/{name}/messages`.
#[derive(Clone, Debug, Deserialize)]
pub struct PostMessageRequest {
    /// Message text.
    pub content: String,
}

/// `?list=true` turns a workspace read into a directory listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkspaceQuery {
    /// List the directory instead of reading a file.
    #[serde(default)]
    pub list: bool,
}

fn messages_path(session: &AgenticSession) -> ApiResult<String> {
    let configured = session.spec.paths.as_ref().and_then(|p| p.messages.as_deref());
    Ok(match configured {
        Some(path) => ambient_content::normalize_path(path)?,
        None => session_path(&session.metadata.name, "messages.json")?,
    })
}

async fn read_messages(state: &AppState, caller: &Caller, project: &str, path: &str) -> ApiResult<Vec<InboxMessage>> {
    match state.content.read(caller.token(), project, path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/projects/{project}/sessions/{name}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
) -> ApiResult<Json<Items<InboxMessage>>> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "get", Some(&name))).await?;
    let session = caller.api::<AgenticSession>(&project).get(&name).await?;
    let path = messages_path(&session)?;
    Ok(Json(read_messages(&state, &caller, &project, &path).await?.into()))
}

/// POST /api/projects/{project}/sessions/{name}/messages
pub async fn post_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
    Json(request): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<InboxMessage>)> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "update", Some(&name))).await?;
    if request.content.trim().is_empty() {
        return Err(ambient_core::ValidationError::missing("content").into());
    }
    let session = caller.api::<AgenticSession>(&project).get(&name).await?;
    let path = messages_path(&session)?;

    let mut messages = read_messages(&state, &caller, &project, &path).await?;
    let message = InboxMessage {
        content: request.content,
        author: caller.display_user().map(String::from),
        timestamp: Utc::now(),
    };
    messages.push(message.clone());
    let encoded = serde_json::to_vec_pretty(&messages)?;
    state.content.write(caller.token(), &project, &path, &encoded).await?;
    debug!(session = %name, count = messages.len(), "inbox message appended");
    Ok((StatusCode::CREATED, Json(message)))
}

async fn read_or_list(state: &AppState, caller: &Caller, project: &str, path: &str, list: bool) -> ApiResult<Response> {
    if list {
        let entries: Vec<ContentEntry> = state.content.list(caller.token(), project, path).await?;
        return Ok(Json(Items::from(entries)).into_response());
    }
    let bytes = state.content.read(caller.token(), project, path).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

/// GET /api/projects/{project}/sessions/{name}/workspace
pub async fn list_session_workspace(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "get", Some(&name))).await?;
    let session = caller.api::<AgenticSession>(&project).get(&name).await?;
    read_or_list(&state, &caller, &project, &workspace_path(&session), true).await
}

/// GET /api/projects/{project}/sessions/{name}/workspace/{*path}
pub async fn read_session_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name, relative)): Path<(String, String, String)>,
    Query(query): Query<WorkspaceQuery>,
) -> ApiResult<Response> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "get", Some(&name))).await?;
    let session = caller.api::<AgenticSession>(&project).get(&name).await?;
    let path = join_under(&workspace_path(&session), &relative)?;
    read_or_list(&state, &caller, &project, &path, query.list).await
}

/// PUT /api/projects/{project}/sessions/{name}/workspace/{*path}
pub async fn write_session_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, name, relative)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    authorize_project(&state, &caller, &project, &check::<AgenticSession>(&project, "update", Some(&name))).await?;
    let session = caller.api::<AgenticSession>(&project).get(&name).await?;
    let path = join_under(&workspace_path(&session), &relative)?;
    state.content.write(caller.token(), &project, &path, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/projects/{project}/workflows/{id}/workspace
pub async fn list_workflow_workspace(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "get", Some(&id))).await?;
    let workflow = caller.api::<Workflow>(&project).get(&id).await?;
    read_or_list(&state, &caller, &project, &workspace_root(&workflow)?, true).await
}

/// GET /api/projects/{project}/workflows/{id}/workspace/{*path}
pub async fn read_workflow_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id, relative)): Path<(String, String, String)>,
    Query(query): Query<WorkspaceQuery>,
) -> ApiResult<Response> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "get", Some(&id))).await?;
    let workflow = caller.api::<Workflow>(&project).get(&id).await?;
    let path = join_under(&workspace_root(&workflow)?, &relative)?;
    read_or_list(&state, &caller, &project, &path, query.list).await
}

/// PUT /api/projects/{project}/workflows/{id}/workspace/{*path}
pub async fn write_workflow_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((project, id, relative)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    authorize_project(&state, &caller, &project, &check::<Workflow>(&project, "update", Some(&id))).await?;
    let workflow = caller.api::<Workflow>(&project).get(&id).await?;
    let path = join_under(&workspace_root(&workflow)?, &relative)?;
    state.content.write(caller.token(), &project, &path, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use ambient_core::ObjectMeta;
    use ambient_core::resources::{AgenticSessionSpec, WorkspacePaths};

    use super::*;

    fn session(paths: Option<WorkspacePaths>) -> AgenticSession {
        AgenticSession::new(
            ObjectMeta::named("s1", "team"),
            AgenticSessionSpec {
                prompt: "p".into(),
                paths,
                ..AgenticSessionSpec::default()
            },
        )
    }

    #[test]
    fn inbox_defaults_to_session_area() {
        assert_eq!(messages_path(&session(None)).unwrap(), "/sessions/s1/messages.json");
    }

    #[test]
    fn configured_inbox_is_normalized() {
        let paths = WorkspacePaths {
            messages: Some("shared//inbox.json".into()),
            ..WorkspacePaths::default()
        };
        assert_eq!(messages_path(&session(Some(paths))).unwrap(), "/shared/inbox.json");
    }

    #[test]
    fn configured_inbox_cannot_escape() {
        let paths = WorkspacePaths {
            messages: Some("../other/messages.json".into()),
            ..WorkspacePaths::default()
        };
        assert!(messages_path(&session(Some(paths))).is_err());
    }

    #[test]
    fn message_wire_format() {
        let message = InboxMessage {
            content: "hi".into(),
            author: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["content"], "hi");
        assert!(json.get("author").is_none());
        assert!(json["timestamp"].is_string());
    }
}

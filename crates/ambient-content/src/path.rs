//! Workspace path normalization.
//!
//! Every path handled by the proxy or the service goes through
//! [`normalize_path`] first: the result always starts with `/`, has no empty
//! or `.` segments, and can never climb out of the tenant root.

use std::path::{Path, PathBuf};

use ambient_core::ValidationError;

fn rejected(raw: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// Normalize a workspace path.
///
/// Empty and `.` segments are dropped and a leading `/` is added. A `..`
/// segment, a backslash or a NUL byte rejects the whole path.
pub fn normalize_path(raw: &str) -> Result<String, ValidationError> {
    if raw.contains('\\') {
        return Err(rejected(raw, "backslashes are not allowed"));
    }
    if raw.contains('\0') {
        return Err(rejected(raw, "NUL bytes are not allowed"));
    }
    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(rejected(raw, "parent segments are not allowed")),
            s => segments.push(s),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// `prefix` joined with the normalized form of `relative`.
pub fn join_under(prefix: &str, relative: &str) -> Result<String, ValidationError> {
    let relative = normalize_path(relative)?;
    let prefix = prefix.trim_end_matches('/');
    Ok(if relative == "/" {
        prefix.to_string()
    } else {
        format!("{prefix}{relative}")
    })
}

/// Path of a file in a session's area: `/sessions/<session>/<relative>`.
pub fn session_path(session: &str, relative: &str) -> Result<String, ValidationError> {
    join_under(&format!("/sessions/{session}"), relative)
}

/// Path inside a workflow workspace: `/workflows/<id>/workspace/<relative>`.
pub fn workflow_workspace_path(workflow: &str, relative: &str) -> Result<String, ValidationError> {
    join_under(&format!("/workflows/{workflow}/workspace"), relative)
}

/// Filesystem location of a normalized path under `root`.
pub fn resolve_under(root: &Path, normalized: &str) -> PathBuf {
    root.join(normalized.trim_start_matches('/'))
}

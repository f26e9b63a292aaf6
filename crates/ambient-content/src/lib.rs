//! # ambient-content
//!
//! Tenant workspace content.
//!
//! - [`ContentProxy`]: client used by the API server; forwards the caller's
//!   credential to the tenant's content service
//! - [`service`]: the content service itself, serving one workspace root
//! - [`path`]: normalization shared by both sides

#![deny(unsafe_code)]

pub mod errors;
pub mod path;
pub mod proxy;
pub mod service;
pub mod types;

pub use errors::{ContentError, ContentResult};
pub use path::{normalize_path, session_path, workflow_workspace_path};
pub use proxy::ContentProxy;
pub use types::{ContentEntry, Encoding, WriteRequest, WriteResponse};

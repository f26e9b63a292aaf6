//! # ambient-server
//!
//! The Session Lifecycle API over the cluster, as the calling user.
//!
//! - [`server::router`]: every `/api/projects/...` route plus `/health`
//! - [`caller`]: bearer credential to caller-scoped store, project access checks
//! - [`handlers`]: sessions, lifecycle transitions, workflows, content, tenancy
//! - [`errors`]: the `{"error": {code, message}}` taxonomy
//! - [`shutdown`]: shared cancellation for the binary's tasks

#![deny(unsafe_code)]

pub mod caller;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use server::{router, serve, serve_on};
pub use shutdown::ShutdownCoordinator;
pub use state::AppState;

//! # ambient-core
//!
//! Foundation types shared by every Ambient crate:
//!
//! - **Resources**: typed schema for `AgenticSession`, `Workflow`,
//!   `ProjectSettings` plus the tenant views (`Project`, `PermissionAssignment`,
//!   `AccessKey`)
//! - **Phase machine**: [`SessionPhase`] and its legal transitions
//! - **Naming**: deterministic names for jobs, runner identities and bindings
//! - **Errors**: [`ValidationError`] for request validation
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod logging;
pub mod naming;
pub mod phase;
pub mod resources;

pub use errors::ValidationError;
pub use phase::SessionPhase;
pub use resources::{ObjectMeta, OwnerReference, Resource};

//! # ambient-controller
//!
//! Turns `AgenticSession` objects into jobs and follows them to the end.
//!
//! - [`Controller`]: watch loop with resubscribe backoff
//! - [`reconcile`]: schedule a job for a pending or restarted session
//! - [`supervisor`]: one cancellable polling task per running session
//! - [`status`]: re-read-then-write status updates, legal edges only
//! - [`job`]: the runner job template and its environment contract

#![deny(unsafe_code)]

pub mod context;
pub mod controller;
pub mod errors;
pub mod job;
pub mod reconcile;
pub mod status;
pub mod supervisor;

pub use context::ControllerContext;
pub use controller::Controller;
pub use errors::{ControllerError, ControllerResult};
pub use job::JobTemplate;
pub use reconcile::{ReconcileOutcome, needs_job, reconcile};
pub use status::{transition, update_status};
pub use supervisor::{SupervisionEnd, SupervisorRegistry, spawn_supervisor};

//! Built-in cluster kinds used by the orchestrator.
//!
//! Only the fields the orchestrator reads or writes are modelled; unknown
//! fields from a real API server are ignored on read.

mod batch;
mod core;
mod rbac;

pub use self::batch::*;
pub use self::core::*;
pub use self::rbac::*;

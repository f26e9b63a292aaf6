//! # ambient-tenancy
//!
//! Tenants and who may act in them. Nothing here has its own storage:
//!
//! - [`projects`]: managed namespaces with display metadata
//! - [`permissions`]: role grants as labelled role bindings
//! - [`access_keys`]: service accounts with a role and a one-time token
//! - [`bootstrap`]: the project cluster roles every grant refers to

#![deny(unsafe_code)]

pub mod access_keys;
pub mod bootstrap;
pub mod errors;
pub mod permissions;
pub mod projects;

pub use errors::{TenancyError, TenancyResult};

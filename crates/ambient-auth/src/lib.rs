//! # ambient-auth
//!
//! Who is calling, what they may do, and what a session's workload may do.
//!
//! - [`CallerCredential`]: bearer credential plus forwarded identity headers
//! - [`authorize`]: access review as the caller
//! - [`CredentialProvisioner`]: per-session runner identity and token

#![deny(unsafe_code)]

pub mod credential;
pub mod errors;
pub mod provisioner;
pub mod review;

pub use credential::{CallerCredential, service_account_subject};
pub use errors::AuthError;
pub use provisioner::{CredentialProvisioner, ProvisionReport, ProvisionStep};
pub use review::authorize;

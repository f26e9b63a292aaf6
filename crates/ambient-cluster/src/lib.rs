//! # ambient-cluster
//!
//! The boundary between the orchestrator and the cluster API.
//!
//! - [`ObjectStore`]: untyped, identity-scoped object access (get, list,
//!   create, replace, delete, watch, logs, tokens, access review)
//! - [`ClusterConnector`]: stores for the service identity and for callers
//! - [`Api`]: typed wrapper; the only place typed resources cross into JSON
//! - [`InMemoryCluster`]: in-process implementation for tests and local runs
//! - [`RestConnector`]: Kubernetes-compatible REST adapter

#![deny(unsafe_code)]

pub mod api;
pub mod errors;
pub mod memory;
pub mod objects;
pub mod rest;
pub mod store;

pub use api::{Api, WatchEvent, WatchStream, from_dynamic, to_dynamic};
pub use errors::{ClusterError, ClusterResult};
pub use memory::InMemoryCluster;
pub use rest::{KubeRestClient, RestConnector};
pub use store::{
    AccessCheck, ClusterConnector, ListParams, ObjectStore, RawWatchEvent, RawWatchStream,
    ResourceKind, UserInfo, WatchEventType,
};

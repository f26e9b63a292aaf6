//! Route handlers, one module per resource family.

pub mod content;
pub mod lifecycle;
pub mod projects;
pub mod sessions;
pub mod settings;
pub mod tenancy;
pub mod workflows;

use serde::Serialize;

/// List response body.
#[derive(Debug, Serialize)]
pub struct Items<T> {
    /// The listed objects.
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for Items<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

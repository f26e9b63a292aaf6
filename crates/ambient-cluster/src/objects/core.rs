//! Core-group kinds: namespaces, service accounts, secrets, pods.

use std::collections::BTreeMap;

use ambient_core::{ObjectMeta, impl_resource};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// A namespace (tenant boundary).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NamespaceStatus>,
}

impl_resource!(Namespace, group = "", version = "v1", kind = "Namespace", plural = "namespaces", namespaced = false);

/// Namespace state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStatus {
    /// `Active` or `Terminating`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// A service account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Object metadata.
    pub metadata: ObjectMeta,
}

impl_resource!(ServiceAccount, group = "", version = "v1", kind = "ServiceAccount", plural = "serviceaccounts");

/// A secret; values in `data` are base64 encoded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Secret type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Base64-encoded values.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl_resource!(Secret, group = "", version = "v1", kind = "Secret", plural = "secrets");

impl Secret {
    /// Opaque secret holding one plain-text value.
    pub fn opaque(metadata: ObjectMeta, key: &str, value: &str) -> Self {
        let mut data = BTreeMap::new();
        let _ = data.insert(key.to_string(), STANDARD.encode(value));
        Self {
            metadata,
            type_: Some("Opaque".to_string()),
            data,
        }
    }

    /// Decoded value of `key`, if present and valid UTF-8.
    pub fn value(&self, key: &str) -> Option<String> {
        let raw = STANDARD.decode(self.data.get(key)?).ok()?;
        String::from_utf8(raw).ok()
    }
}

/// A pod (read-only: located by the `job-name` label to fetch logs).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

impl_resource!(Pod, group = "", version = "v1", kind = "Pod", plural = "pods", status = true);

/// Pod state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    /// `Pending`, `Running`, `Succeeded`, `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_round_trips_value() {
        let secret = Secret::opaque(ObjectMeta::named("s", "ns"), "k8s-token", "abc.def");
        assert_eq!(secret.data["k8s-token"], "YWJjLmRlZg==");
        assert_eq!(secret.value("k8s-token").as_deref(), Some("abc.def"));
        assert_eq!(secret.value("missing"), None);
    }

    #[test]
    fn secret_type_field_name() {
        let secret = Secret::opaque(ObjectMeta::named("s", "ns"), "k", "v");
        let json = serde_json::to_value(&secret).unwrap();
        assert_eq!(json["type"], "Opaque");
    }
}

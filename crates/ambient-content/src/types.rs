//! Wire types shared by the proxy and the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One directory entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    /// File name.
    pub name: String,
    /// Normalized path from the tenant root.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// How [`WriteRequest::content`] is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Plain UTF-8 text.
    #[default]
    Utf8,
    /// Standard base64.
    Base64,
}

/// Body of `POST /content/write`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Target path.
    pub path: String,
    /// Encoded content.
    pub content: String,
    /// Encoding of `content`.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Response to a successful write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Normalized path written.
    pub path: String,
    /// Bytes written.
    pub size: u64,
}

/// `?path=` query used by read and list.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PathQuery {
    /// Requested path; empty means the root.
    #[serde(default)]
    pub path: String,
}

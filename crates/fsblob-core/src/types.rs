//! Value types returned by storage operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Description of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Normalized logical name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Quoted hex MD5 for simple uploads, `"<hex>-<n>"` for assembled objects.
    pub etag: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// A part stored inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartInfo {
    /// Part number (1-based, up to 10 000).
    pub part_number: u32,
    /// Identity token of the stored bytes (quoted hex MD5).
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// When the part was last written.
    pub last_modified: DateTime<Utc>,
}

/// One entry of a completion request: a part number and the identity the
/// caller received when uploading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// Part number.
    pub part_number: u32,
    /// Identity token, quoted or bare.
    pub etag: String,
}

impl CompletedPart {
    /// Convenience constructor.
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Persisted state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Accepting parts.
    Accumulating,
    /// Assembly has started; only a complete retry or an abort is accepted.
    Assembling,
}

/// Self-describing view of a live session, recoverable from disk alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session token.
    pub token: String,
    /// Normalized name of the object the session will produce.
    pub object_name: String,
    /// When the session directory was created.
    pub initiated: DateTime<Utc>,
    /// Current state.
    pub state: SessionState,
}

/// Record of a finished assembly, kept so that a repeated completion with the
/// same part list is answered without touching the object again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompletionReceipt {
    pub object_name: String,
    pub parts: Vec<CompletedPart>,
    pub etag: String,
    pub size: u64,
    pub completed_at: DateTime<Utc>,
}

impl CompletionReceipt {
    pub(crate) fn object_info(&self) -> ObjectInfo {
        ObjectInfo {
            name: self.object_name.clone(),
            size: self.size,
            etag: self.etag.clone(),
            last_modified: self.completed_at,
        }
    }
}

/// An open object ready to be streamed.
pub struct ObjectStream {
    /// Normalized logical name.
    pub name: String,
    /// Size in bytes at open time.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// The content.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Result of [`write_stream`](crate::provider::StorageProvider::write_stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A whole object was written.
    Object(ObjectInfo),
    /// A part was written into a session.
    Part(PartInfo),
}

impl WriteOutcome {
    /// The part identity token, present only for part writes.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Object(_) => None,
            Self::Part(part) => Some(&part.etag),
        }
    }

    /// The digest of whatever was written.
    #[must_use]
    pub fn etag(&self) -> &str {
        match self {
            Self::Object(info) => &info.etag,
            Self::Part(part) => &part.etag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_expose_identity_only_for_parts() {
        let part = WriteOutcome::Part(PartInfo {
            part_number: 1,
            etag: "\"abc\"".to_owned(),
            size: 4,
            last_modified: Utc::now(),
        });
        assert_eq!(part.identity(), Some("\"abc\""));

        let object = WriteOutcome::Object(ObjectInfo {
            name: "a.txt".to_owned(),
            size: 4,
            etag: "\"def\"".to_owned(),
            last_modified: Utc::now(),
        });
        assert_eq!(object.identity(), None);
        assert_eq!(object.etag(), "\"def\"");
    }

    #[test]
    fn test_should_deserialize_completed_parts_from_camel_case() {
        let parts: Vec<CompletedPart> =
            serde_json::from_str(r#"[{"partNumber":2,"etag":"\"x\""},{"partNumber":1,"etag":"y"}]"#)
                .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(parts[0], CompletedPart::new(2, "\"x\""));
        assert_eq!(parts[1].part_number, 1);
    }
}

//! Remote document and blob storage.
//!
//! Exported sessions live in a named collection of JSON documents; photos
//! are stored as blobs under hierarchical paths and referenced from the
//! document by URL and path. [`RemoteStore`] abstracts the backend:
//!
//! - [`DirectoryRemote`]: a local or mounted directory
//! - [`HttpRemote`]: an HTTP document/blob service (feature `http-remote`)

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

mod dir;
#[cfg(feature = "http-remote")]
mod http;

pub use dir::DirectoryRemote;
#[cfg(feature = "http-remote")]
pub use http::HttpRemote;

/// Content type for every uploaded photo.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote is unreachable: {0}")]
    Unreachable(String),

    #[error("Not authorized to access the remote")]
    Unauthorized,

    #[error("Remote returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid remote document: {0}")]
    InvalidDocument(String),

    #[error("Invalid remote path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "http-remote")]
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl RemoteError {
    /// Failures that may go away if the user tries again later.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) | RemoteError::Io(_) => true,
            RemoteError::Http { status, .. } => *status >= 500,
            #[cfg(feature = "http-remote")]
            RemoteError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A stored document and its identifier within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    pub data: Value,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// The `createdAt` field parsed as RFC 3339, if present.
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        self.data
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
    }

    /// The `name` field, falling back to the document id.
    pub fn display_name(&self) -> &str {
        self.data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }
}

/// Content type and custom key/value metadata attached to a blob.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub content_type: String,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl BlobMetadata {
    pub fn jpeg() -> Self {
        Self {
            content_type: JPEG_CONTENT_TYPE.to_string(),
            custom: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// Ordering applied when listing a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    /// Most recently exported first.
    pub fn newest_first() -> Self {
        Self {
            field: "createdAt".to_string(),
            descending: true,
        }
    }
}

/// Sort documents in place the way a backend without native ordering should.
///
/// Values that parse as RFC 3339 compare chronologically, other strings
/// and numbers compare naturally, and documents missing the field sort last.
pub fn sort_documents(documents: &mut [RemoteDocument], order: &OrderBy) {
    documents.sort_by(|a, b| {
        let (va, vb) = (a.data.get(&order.field), b.data.get(&order.field));
        match (va, vb) {
            (None, None) => a.id.cmp(&b.id),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(va), Some(vb)) => {
                let ord = compare_values(va, vb);
                if order.descending { ord.reverse() } else { ord }
            }
        }
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            match (
                OffsetDateTime::parse(a, &Rfc3339),
                OffsetDateTime::parse(b, &Rfc3339),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Split a blob path into segments, rejecting anything that could escape
/// its root.
pub(crate) fn path_segments(path: &str) -> RemoteResult<Vec<&str>> {
    if path.is_empty() || path.starts_with('/') {
        return Err(RemoteError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments {
        validate_segment(segment).map_err(|_| RemoteError::InvalidPath(path.to_string()))?;
    }
    Ok(segments)
}

/// A single path component: a collection name or document id.
pub(crate) fn validate_segment(segment: &str) -> RemoteResult<()> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\'])
    {
        return Err(RemoteError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

/// Document and blob storage for exported sessions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether a document with this id exists in `collection`.
    async fn exists(&self, collection: &str, id: &str) -> RemoteResult<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDocument>>;

    /// Create or replace a document.
    async fn write(&self, collection: &str, id: &str, data: &Value) -> RemoteResult<()>;

    async fn list(&self, collection: &str, order: &OrderBy) -> RemoteResult<Vec<RemoteDocument>>;

    /// Store a blob and return a URL it can be fetched from.
    async fn upload(&self, path: &str, data: Bytes, metadata: &BlobMetadata)
    -> RemoteResult<String>;

    /// Resolve a blob path to a fetchable URL.
    async fn resolve_url(&self, path: &str) -> RemoteResult<String>;

    /// Download the bytes behind a URL returned by `upload` or `resolve_url`.
    async fn fetch(&self, url: &str) -> RemoteResult<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, created: &str) -> RemoteDocument {
        RemoteDocument::new(id, json!({ "name": id, "createdAt": created }))
    }

    #[test]
    fn test_is_transient() {
        assert!(RemoteError::Unreachable("x".into()).is_transient());
        assert!(
            RemoteError::Http {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(
            !RemoteError::Http {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
        assert!(!RemoteError::Unauthorized.is_transient());
        assert!(!RemoteError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn test_sort_newest_first() {
        let mut docs = vec![
            doc("a", "2025-01-01T10:00:00Z"),
            doc("c", "2025-03-01T10:00:00+09:00"),
            RemoteDocument::new("z", json!({ "name": "z" })),
            doc("b", "2025-02-01T10:00:00Z"),
        ];
        sort_documents(&mut docs, &OrderBy::newest_first());
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a", "z"]);
    }

    #[test]
    fn test_document_accessors() {
        let d = doc("walk", "2025-01-01T10:00:00Z");
        assert_eq!(d.display_name(), "walk");
        assert_eq!(d.created_at().unwrap().year(), 2025);
        let bare = RemoteDocument::new("id-only", json!({}));
        assert_eq!(bare.display_name(), "id-only");
        assert!(bare.created_at().is_none());
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(
            path_segments("projects/walk/photos/1.jpg").unwrap(),
            ["projects", "walk", "photos", "1.jpg"]
        );
        assert!(path_segments("").is_err());
        assert!(path_segments("/etc/passwd").is_err());
        assert!(path_segments("projects/../secret").is_err());
        assert!(path_segments("projects//x").is_err());
    }

    #[test]
    fn test_blob_metadata_builder() {
        let meta = BlobMetadata::jpeg().with("lat", "35.1");
        assert_eq!(meta.content_type, "image/jpeg");
        assert_eq!(meta.custom.get("lat").map(String::as_str), Some("35.1"));
    }
}

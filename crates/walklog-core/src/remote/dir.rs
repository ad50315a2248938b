//! A remote backed by a plain directory tree.
//!
//! ```text
//! <root>/documents/<collection>/<id>.json
//! <root>/blobs/<path>
//! <root>/blobs/<path>.meta.json
//! ```
//!
//! Document ids are percent-encoded in file names so that names like
//! `2025-01-01T10:00` are valid on every filesystem. Blob URLs use the
//! `file://` scheme.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::{
    BlobMetadata, OrderBy, RemoteDocument, RemoteError, RemoteResult, RemoteStore,
    path_segments, sort_documents, validate_segment,
};

const FILE_SCHEME: &str = "file://";
const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    /// Use `root` as the remote. It is created on first write.
    pub fn new(root: impl AsRef<Path>) -> RemoteResult<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> RemoteResult<PathBuf> {
        validate_segment(collection)?;
        Ok(self.root.join("documents").join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> RemoteResult<PathBuf> {
        if id.is_empty() {
            return Err(RemoteError::InvalidPath(id.to_string()));
        }
        Ok(self
            .collection_dir(collection)?
            .join(format!("{}.json", encode_component(id))))
    }

    fn blob_path(&self, path: &str) -> RemoteResult<PathBuf> {
        let mut full = self.root.join("blobs");
        for segment in path_segments(path)? {
            full.push(segment);
        }
        Ok(full)
    }

    fn url_for(path: &Path) -> String {
        format!("{FILE_SCHEME}{}", path.display())
    }

    /// Map a URL back to a file, refusing anything outside the blob root.
    fn file_for_url(&self, url: &str) -> RemoteResult<PathBuf> {
        let path = url
            .strip_prefix(FILE_SCHEME)
            .map(PathBuf::from)
            .ok_or_else(|| RemoteError::InvalidPath(url.to_string()))?;
        let blobs = self.root.join("blobs");
        let relative = path
            .strip_prefix(&blobs)
            .map_err(|_| RemoteError::InvalidPath(url.to_string()))?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        self.blob_path(&relative)
    }
}

async fn read_optional(path: &Path) -> RemoteResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_file(path: &Path, data: &[u8]) -> RemoteResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // Write then rename so readers never see a half-written file
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn exists(&self, collection: &str, id: &str) -> RemoteResult<bool> {
        let path = self.document_path(collection, id)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDocument>> {
        let path = self.document_path(collection, id)?;
        let Some(raw) = read_optional(&path).await? else {
            return Ok(None);
        };
        let data: Value = serde_json::from_slice(&raw)?;
        Ok(Some(RemoteDocument::new(id, data)))
    }

    async fn write(&self, collection: &str, id: &str, data: &Value) -> RemoteResult<()> {
        let path = self.document_path(collection, id)?;
        let raw = serde_json::to_vec_pretty(data)?;
        write_file(&path, &raw).await?;
        debug!("Wrote document {}/{} to {}", collection, id, path.display());
        Ok(())
    }

    async fn list(&self, collection: &str, order: &OrderBy) -> RemoteResult<Vec<RemoteDocument>> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_component)
            else {
                warn!("Skipping unreadable document name {}", path.display());
                continue;
            };
            let raw = fs::read(&path).await?;
            match serde_json::from_slice::<Value>(&raw) {
                Ok(data) => documents.push(RemoteDocument::new(id, data)),
                Err(e) => warn!("Skipping malformed document {}: {}", path.display(), e),
            }
        }

        sort_documents(&mut documents, order);
        Ok(documents)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        metadata: &BlobMetadata,
    ) -> RemoteResult<String> {
        let target = self.blob_path(path)?;
        write_file(&target, &data).await?;

        let mut meta_path = target.clone().into_os_string();
        meta_path.push(META_SUFFIX);
        write_file(Path::new(&meta_path), &serde_json::to_vec_pretty(metadata)?).await?;

        Ok(Self::url_for(&target))
    }

    async fn resolve_url(&self, path: &str) -> RemoteResult<String> {
        let target = self.blob_path(path)?;
        if !fs::try_exists(&target).await? {
            return Err(RemoteError::NotFound(path.to_string()));
        }
        Ok(Self::url_for(&target))
    }

    async fn fetch(&self, url: &str) -> RemoteResult<Bytes> {
        let path = self.file_for_url(url)?;
        read_optional(&path)
            .await?
            .map(Bytes::from)
            .ok_or_else(|| RemoteError::NotFound(url.to_string()))
    }
}

fn encode_component(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b' ' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode_component(name: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(name.len());
    let mut iter = name.bytes();
    while let Some(b) = iter.next() {
        if b == b'%' {
            let hi = (iter.next()? as char).to_digit(16)?;
            let lo = (iter.next()? as char).to_digit(16)?;
            bytes.push((hi * 16 + lo) as u8);
        } else {
            bytes.push(b);
        }
    }
    String::from_utf8(bytes).ok()
}

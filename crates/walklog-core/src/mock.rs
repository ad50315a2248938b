//! Test doubles for the recorder and sync engine.
//!
//! - [`MockPositionSource`]: a channel-fed source that can refuse to subscribe
//! - [`MockWakeLock`]: counts acquisitions and can be unsupported or denied
//! - [`MemoryRemote`]: an in-memory remote with per-call and per-path failure injection
//! - [`ScriptedPrompt`]: answers questions from queues and records what was asked
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use walklog_core::mock::MemoryRemote;
//! use walklog_core::remote::{BlobMetadata, RemoteStore};
//!
//! # async fn example() {
//! let remote = MemoryRemote::new();
//! remote.fail_upload_at(2).await;
//!
//! let meta = BlobMetadata::jpeg();
//! assert!(remote.upload("a.jpg", Bytes::from_static(b"1"), &meta).await.is_ok());
//! assert!(remote.upload("b.jpg", Bytes::from_static(b"2"), &meta).await.is_err());
//! # }
//! ```

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::RwLock;

use walklog_store::DataStats;

use crate::error::Result;
use crate::position::{
    ChannelSource, PositionError, PositionFeed, PositionSource, PositionSubscription,
    SubscribeOptions,
};
use crate::power::{WakeLock, WakeLockError};
use crate::prompt::{Prompt, StartDecision};
use crate::remote::{
    BlobMetadata, OrderBy, RemoteDocument, RemoteError, RemoteResult, RemoteStore,
    path_segments, sort_documents, validate_segment,
};

const MEMORY_SCHEME: &str = "memory://";

/// A position source for tests, fed through [`MockPositionSource::feed`].
#[derive(Debug, Default)]
pub struct MockPositionSource {
    inner: ChannelSource,
    refuse_with: RwLock<Option<PositionError>>,
    subscribe_count: AtomicU32,
}

impl MockPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&self) -> PositionFeed {
        self.inner.feed()
    }

    /// Make every following subscribe fail with `error`, or succeed again with `None`.
    pub async fn refuse_with(&self, error: Option<PositionError>) {
        *self.refuse_with.write().await = error;
    }

    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for MockPositionSource {
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<PositionSubscription> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.refuse_with.read().await.clone() {
            return Err(error.into());
        }
        self.inner.subscribe(options).await
    }
}

/// A wake lock that records how it was used.
#[derive(Debug)]
pub struct MockWakeLock {
    supported: AtomicBool,
    deny: AtomicBool,
    held: AtomicBool,
    acquire_count: AtomicU32,
    release_count: AtomicU32,
}

impl Default for MockWakeLock {
    fn default() -> Self {
        Self {
            supported: AtomicBool::new(true),
            deny: AtomicBool::new(false),
            held: AtomicBool::new(false),
            acquire_count: AtomicU32::new(0),
            release_count: AtomicU32::new(0),
        }
    }
}

impl MockWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        let lock = Self::default();
        lock.supported.store(false, Ordering::SeqCst);
        lock
    }

    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Acquire attempts, including failed ones.
    pub fn acquire_count(&self) -> u32 {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> u32 {
        self.release_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WakeLock for MockWakeLock {
    async fn acquire(&self) -> std::result::Result<(), WakeLockError> {
        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        if !self.supported.load(Ordering::SeqCst) {
            return Err(WakeLockError::Unsupported);
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(WakeLockError::Denied("mock denial".to_string()));
        }
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> std::result::Result<(), WakeLockError> {
        self.release_count.fetch_add(1, Ordering::SeqCst);
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// An in-memory remote store.
///
/// Blob URLs have the form `memory://{path}`.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    documents: RwLock<BTreeMap<(String, String), Value>>,
    blobs: RwLock<BTreeMap<String, (Bytes, BlobMetadata)>>,
    upload_calls: AtomicU32,
    fail_upload_calls: RwLock<HashSet<u32>>,
    fail_upload_paths: RwLock<Vec<String>>,
    fail_fetch_urls: RwLock<Vec<String>>,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th upload (1-based).
    pub async fn fail_upload_at(&self, call: u32) {
        self.fail_upload_calls.write().await.insert(call);
    }

    /// Fail uploads whose path contains `pattern`.
    pub async fn fail_uploads_matching(&self, pattern: impl Into<String>) {
        self.fail_upload_paths.write().await.push(pattern.into());
    }

    /// Fail fetches whose URL contains `pattern`.
    pub async fn fail_fetches_matching(&self, pattern: impl Into<String>) {
        self.fail_fetch_urls.write().await.push(pattern.into());
    }

    /// While offline every operation fails with [`RemoteError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn blob(&self, path: &str) -> Option<(Bytes, BlobMetadata)> {
        self.blobs.read().await.get(path).cloned()
    }

    pub async fn remove_blob(&self, path: &str) -> bool {
        self.blobs.write().await.remove(path).is_some()
    }

    pub async fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.documents
            .read()
            .await
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Store a document directly, bypassing failure injection.
    pub async fn insert_document(&self, collection: &str, id: &str, data: Value) {
        self.documents
            .write()
            .await
            .insert((collection.to_string(), id.to_string()), data);
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("memory remote is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDocument>> {
        self.check_online()?;
        validate_segment(collection)?;
        Ok(self
            .document(collection, id)
            .await
            .map(|data| RemoteDocument::new(id, data)))
    }

    async fn write(&self, collection: &str, id: &str, data: &Value) -> RemoteResult<()> {
        self.check_online()?;
        validate_segment(collection)?;
        self.insert_document(collection, id, data.clone()).await;
        Ok(())
    }

    async fn list(&self, collection: &str, order: &OrderBy) -> RemoteResult<Vec<RemoteDocument>> {
        self.check_online()?;
        validate_segment(collection)?;
        let mut documents: Vec<RemoteDocument> = self
            .documents
            .read()
            .await
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), data)| RemoteDocument::new(id.clone(), data.clone()))
            .collect();
        sort_documents(&mut documents, order);
        Ok(documents)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        metadata: &BlobMetadata,
    ) -> RemoteResult<String> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_online()?;
        path_segments(path)?;

        let injected = self.fail_upload_calls.read().await.contains(&call)
            || self
                .fail_upload_paths
                .read()
                .await
                .iter()
                .any(|p| path.contains(p.as_str()));
        if injected {
            return Err(RemoteError::Http {
                status: 500,
                message: format!("injected upload failure for {path}"),
            });
        }

        self.blobs
            .write()
            .await
            .insert(path.to_string(), (data, metadata.clone()));
        Ok(format!("{MEMORY_SCHEME}{path}"))
    }

    async fn resolve_url(&self, path: &str) -> RemoteResult<String> {
        self.check_online()?;
        if !self.blobs.read().await.contains_key(path) {
            return Err(RemoteError::NotFound(path.to_string()));
        }
        Ok(format!("{MEMORY_SCHEME}{path}"))
    }

    async fn fetch(&self, url: &str) -> RemoteResult<Bytes> {
        self.check_online()?;
        if self
            .fail_fetch_urls
            .read()
            .await
            .iter()
            .any(|p| url.contains(p.as_str()))
        {
            return Err(RemoteError::Unreachable(format!("injected fetch failure for {url}")));
        }
        let path = url
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| RemoteError::InvalidPath(url.to_string()))?;
        self.blobs
            .read()
            .await
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| RemoteError::NotFound(url.to_string()))
    }
}

/// A prompt that answers from queues.
///
/// When a queue runs dry the answer is the cautious one: cancel, no name,
/// no choice, no confirmation.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    start: VecDeque<StartDecision>,
    names: VecDeque<Option<String>>,
    choices: VecDeque<Option<usize>>,
    clears: VecDeque<bool>,
    /// Stats shown with each start question.
    pub start_questions: Vec<DataStats>,
    /// Default names offered for export.
    pub offered_names: Vec<String>,
    /// Document ids offered for import.
    pub offered_documents: Vec<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then_start(mut self, decision: StartDecision) -> Self {
        self.start.push_back(decision);
        self
    }

    /// Answer the next export-name question with `name` (`None` dismisses it).
    #[must_use]
    pub fn then_name(mut self, name: Option<&str>) -> Self {
        self.names.push_back(name.map(String::from));
        self
    }

    #[must_use]
    pub fn then_choose(mut self, index: Option<usize>) -> Self {
        self.choices.push_back(index);
        self
    }

    #[must_use]
    pub fn then_confirm(mut self, confirm: bool) -> Self {
        self.clears.push_back(confirm);
        self
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn start_decision(&mut self, existing: &DataStats) -> StartDecision {
        self.start_questions.push(*existing);
        self.start.pop_front().unwrap_or(StartDecision::Cancel)
    }

    async fn export_name(&mut self, default_name: &str) -> Option<String> {
        self.offered_names.push(default_name.to_string());
        self.names.pop_front().flatten()
    }

    async fn choose_document(&mut self, documents: &[RemoteDocument]) -> Option<usize> {
        self.offered_documents
            .push(documents.iter().map(|d| d.id.clone()).collect());
        self.choices.pop_front().flatten()
    }

    async fn confirm_clear(&mut self, _existing: &DataStats) -> bool {
        self.clears.pop_front().unwrap_or(false)
    }
}

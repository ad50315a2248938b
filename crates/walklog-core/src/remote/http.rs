//! HTTP client for a walklog document/blob service.
//!
//! Endpoints, relative to the base URL:
//!
//! | Method | Path | Body / response |
//! |--------|------|-----------------|
//! | `GET` | `/documents/{collection}?order_by=..&direction=..` | `[{"id", "data"}]` |
//! | `GET` | `/documents/{collection}/{id}` | document JSON, 404 if absent |
//! | `PUT` | `/documents/{collection}/{id}` | document JSON |
//! | `PUT` | `/blobs/{path}` | raw bytes, returns `{"url"}` |
//! | `GET` | `/blobs/{path}/url` | `{"url"}` |
//!
//! Blob metadata travels as `x-walklog-meta-*` headers. Errors carry an
//! optional `{"error": "..."}` body.
//!
//! # Example
//!
//! ```no_run
//! use walklog_core::remote::{HttpRemote, OrderBy, RemoteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpRemote::new("https://sync.example.com/api")?;
//! for doc in remote.list("projects", &OrderBy::newest_first()).await? {
//!     println!("{}", doc.display_name());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{
    BlobMetadata, OrderBy, RemoteDocument, RemoteError, RemoteResult, RemoteStore,
    path_segments, validate_segment,
};

const META_HEADER_PREFIX: &str = "x-walklog-meta-";

#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

impl HttpRemote {
    /// Connect to the service at `base_url` with a 10 second request timeout.
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RemoteError::Request)?;
        Self::with_client(base_url, client)
    }

    /// Create a remote with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> RemoteResult<Self> {
        let trimmed = base_url.trim_end_matches('/');
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(RemoteError::InvalidPath(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }
        let base_url = Url::parse(trimmed)
            .map_err(|e| RemoteError::InvalidPath(format!("{base_url}: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidPath(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, collection: &str, id: &str) -> RemoteResult<Url> {
        validate_segment(collection)?;
        if id.is_empty() {
            return Err(RemoteError::InvalidPath(id.to_string()));
        }
        self.endpoint(["documents", collection, id])
    }

    fn blob_url(&self, path: &str) -> RemoteResult<Url> {
        let segments = path_segments(path)?;
        self.endpoint(std::iter::once("blobs").chain(segments))
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> RemoteResult<Response> {
        request
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(format!("{url}: {e}")))
    }
}

/// Turn a non-success response into the matching error.
async fn check(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
        StatusCode::NOT_FOUND => Err(RemoteError::NotFound(response.url().to_string())),
        _ => {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());

            Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDocument>> {
        let url = self.document_url(collection, id)?;
        let response = self.send(self.client.get(url.clone()), &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let data: Value = check(response).await?.json().await?;
        Ok(Some(RemoteDocument::new(id, data)))
    }

    async fn write(&self, collection: &str, id: &str, data: &Value) -> RemoteResult<()> {
        let url = self.document_url(collection, id)?;
        let response = self.send(self.client.put(url.clone()).json(data), &url).await?;
        check(response).await?;
        debug!("Wrote document {}/{}", collection, id);
        Ok(())
    }

    async fn list(&self, collection: &str, order: &OrderBy) -> RemoteResult<Vec<RemoteDocument>> {
        validate_segment(collection)?;
        let mut url = self.endpoint(["documents", collection])?;
        url.query_pairs_mut()
            .append_pair("order_by", &order.field)
            .append_pair("direction", if order.descending { "desc" } else { "asc" });

        let response = self.send(self.client.get(url.clone()), &url).await?;
        Ok(check(response).await?.json().await?)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        metadata: &BlobMetadata,
    ) -> RemoteResult<String> {
        let url = self.blob_url(path)?;
        let mut request = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, &metadata.content_type)
            .body(data);
        for (key, value) in &metadata.custom {
            request = request.header(format!("{META_HEADER_PREFIX}{key}"), value);
        }

        let response = self.send(request, &url).await?;
        let body: UrlResponse = check(response).await?.json().await?;
        Ok(body.url)
    }

    async fn resolve_url(&self, path: &str) -> RemoteResult<String> {
        let mut url = self.blob_url(path)?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidPath(path.to_string()))?
            .push("url");
        let response = self.send(self.client.get(url.clone()), &url).await?;
        let body: UrlResponse = check(response).await?.json().await?;
        Ok(body.url)
    }

    async fn fetch(&self, url: &str) -> RemoteResult<Bytes> {
        let parsed =
            Url::parse(url).map_err(|e| RemoteError::InvalidPath(format!("{url}: {e}")))?;
        let response = self.send(self.client.get(parsed.clone()), &parsed).await?;
        Ok(check(response).await?.bytes().await?)
    }
}

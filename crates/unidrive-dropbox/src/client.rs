//! HTTP client for the Dropbox REST API
//!
//! Wraps `reqwest::Client` with endpoint construction, bearer signing and
//! status mapping into the shared error taxonomy. An authorization failure
//! is retried exactly once after refreshing credentials - a bounded loop,
//! at most two attempts per request. Requests whose body cannot be
//! replayed (streams) get a single attempt.

use std::sync::Arc;

use anyhow::Context;
use futures_util::TryStreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use unidrive_core::provider::ContentStream;
use unidrive_core::{StorageError, TokenSource};

use crate::api::{AccountInfo, ApiError, ChunkAck, DeltaPage, EntryMetadata};
use crate::config::DropboxConfig;

/// Maximum attempts per request: the original try plus one refresh retry
const MAX_AUTH_ATTEMPTS: u32 = 2;

pub(crate) struct DropboxClient {
    http: reqwest::Client,
    config: DropboxConfig,
    tokens: Arc<dyn TokenSource>,
}

impl DropboxClient {
    pub fn new(
        http: reqwest::Client,
        config: DropboxConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            config,
            tokens,
        }
    }

    /// Builds `{base}/{segments...}` with each segment percent-encoded
    fn endpoint(base: &str, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(base)
            .with_context(|| format!("invalid base URL {base:?}"))
            .map_err(StorageError::Transport)?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| StorageError::transport("base URL cannot carry paths"))?;
            parts.pop_if_empty();
            for segment in segments {
                for piece in segment.split('/').filter(|s| !s.is_empty()) {
                    parts.push(piece);
                }
            }
        }
        Ok(url)
    }

    fn api_endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        Self::endpoint(&self.config.api_base, segments)
    }

    fn content_endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        Self::endpoint(&self.config.content_base, segments)
    }

    // ------------------------------------------------------------------
    // Signing and dispatch
    // ------------------------------------------------------------------

    /// Sends a request with bearer signing and the single refresh retry,
    /// without interpreting the response status
    pub(crate) async fn dispatch(&self, req: RequestBuilder) -> Result<Response, StorageError> {
        let mut token = self.tokens.bearer().await?;

        if req.try_clone().is_none() {
            // Streaming body: cannot be replayed, single attempt.
            return req
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| StorageError::Transport(anyhow::Error::new(e)));
        }

        for attempt in 0..MAX_AUTH_ATTEMPTS {
            let prepared = match req.try_clone() {
                Some(prepared) => prepared,
                None => return Err(StorageError::transport("request became non-replayable")),
            };
            let response = prepared
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt + 1 < MAX_AUTH_ATTEMPTS {
                debug!("request rejected with 401, refreshing credentials once");
                token = self.tokens.refresh().await?;
                continue;
            }
            return Ok(response);
        }
        Err(StorageError::transport("retry loop exhausted"))
    }

    /// Sends a request and maps non-success statuses into the taxonomy
    pub(crate) async fn send(&self, req: RequestBuilder) -> Result<Response, StorageError> {
        let response = self.dispatch(req).await?;
        Self::check_status(response).await
    }

    /// Maps a non-success response into the shared error taxonomy
    async fn check_status(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::map_status(status, &body))
    }

    pub(crate) fn map_status(status: StatusCode, body: &str) -> StorageError {
        let message = ApiError::message_from(body)
            .unwrap_or_else(|| format!("({})", status.as_u16()));
        match status.as_u16() {
            401 => StorageError::AuthorizationFailure(message),
            403 | 409 => StorageError::Conflict(message),
            404 => StorageError::NotFound(message),
            code if (500..600).contains(&code) => StorageError::ProviderUnavailable {
                status: code,
                message,
            },
            code => StorageError::Transport(anyhow::anyhow!("unexpected status {code}: {message}")),
        }
    }

    // ------------------------------------------------------------------
    // Account and metadata
    // ------------------------------------------------------------------

    pub async fn account_info(&self) -> Result<AccountInfo, StorageError> {
        let url = self.api_endpoint(&["account/info"])?;
        let response = self.send(self.http.get(url)).await?;
        response
            .json()
            .await
            .context("failed to parse account info")
            .map_err(StorageError::Transport)
    }

    /// Fetches metadata for a path; `Ok(None)` when the supplied marker is
    /// still current (HTTP 304)
    pub async fn metadata(
        &self,
        path: &str,
        list: bool,
        marker: Option<&str>,
    ) -> Result<Option<EntryMetadata>, StorageError> {
        let url = self.api_endpoint(&["metadata", &self.config.root, path])?;
        let mut req = self.http.get(url);
        if !list {
            req = req.query(&[("list", "false")]);
        }
        if let Some(marker) = marker {
            req = req.query(&[("hash", marker)]);
        }

        let response = self.dispatch(req).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;
        let metadata = response
            .json()
            .await
            .context("failed to parse metadata")
            .map_err(StorageError::Transport)?;
        Ok(Some(metadata))
    }

    // ------------------------------------------------------------------
    // Delta feed
    // ------------------------------------------------------------------

    pub async fn delta(&self, cursor: Option<&str>) -> Result<DeltaPage, StorageError> {
        let url = self.api_endpoint(&["delta"])?;
        let mut req = self.http.post(url);
        if let Some(cursor) = cursor {
            req = req.query(&[("cursor", cursor)]);
        }
        let response = self.send(req).await?;
        response
            .json()
            .await
            .context("failed to parse delta page")
            .map_err(StorageError::Transport)
    }

    // ------------------------------------------------------------------
    // File operations
    // ------------------------------------------------------------------

    pub async fn create_folder(&self, path: &str) -> Result<EntryMetadata, StorageError> {
        let url = self.api_endpoint(&["fileops/create_folder"])?;
        let req = self
            .http
            .post(url)
            .query(&[("root", self.config.root.as_str()), ("path", path)]);
        let response = self.send(req).await?;
        response
            .json()
            .await
            .context("failed to parse create_folder response")
            .map_err(StorageError::Transport)
    }

    async fn fileops_transfer(
        &self,
        op: &str,
        from_path: &str,
        to_path: &str,
    ) -> Result<EntryMetadata, StorageError> {
        let url = self.api_endpoint(&[&format!("fileops/{op}")])?;
        let req = self.http.post(url).query(&[
            ("root", self.config.root.as_str()),
            ("from_path", from_path),
            ("to_path", to_path),
        ]);
        let response = self.send(req).await?;
        response
            .json()
            .await
            .with_context(|| format!("failed to parse {op} response"))
            .map_err(StorageError::Transport)
    }

    pub async fn move_entry(
        &self,
        from_path: &str,
        to_path: &str,
    ) -> Result<EntryMetadata, StorageError> {
        self.fileops_transfer("move", from_path, to_path).await
    }

    pub async fn copy_entry(
        &self,
        from_path: &str,
        to_path: &str,
    ) -> Result<EntryMetadata, StorageError> {
        self.fileops_transfer("copy", from_path, to_path).await
    }

    pub async fn delete_entry(&self, path: &str) -> Result<(), StorageError> {
        let url = self.api_endpoint(&["fileops/delete"])?;
        let req = self
            .http
            .post(url)
            .query(&[("root", self.config.root.as_str()), ("path", path)]);
        self.send(req).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    pub async fn download(&self, path: &str) -> Result<ContentStream, StorageError> {
        let url = self.content_endpoint(&["files", &self.config.root, path])?;
        let response = self.send(self.http.get(url)).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(stream)))
    }

    /// PUTs one slice of a resumable upload session
    ///
    /// The server's reported offset is authoritative: a client-error status
    /// whose body still parses as an acknowledgement is reconciled into the
    /// session state instead of failing the upload.
    pub async fn put_chunk(
        &self,
        chunk: Vec<u8>,
        offset: u64,
        upload_id: Option<&str>,
    ) -> Result<ChunkAck, StorageError> {
        let url = self.content_endpoint(&["chunked_upload"])?;
        let mut req = self
            .http
            .put(url)
            .query(&[("offset", offset.to_string().as_str())])
            .header("Content-Type", "application/octet-stream");
        if let Some(id) = upload_id {
            req = req.query(&[("upload_id", id)]);
        }
        req = req.body(chunk);

        let response = self.dispatch(req).await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str(&body)
                .context("failed to parse chunk acknowledgement")
                .map_err(StorageError::Transport);
        }
        if status.is_client_error() {
            if let Ok(ack) = serde_json::from_str::<ChunkAck>(&body) {
                debug!(
                    server_offset = ack.offset,
                    "server corrected the session offset"
                );
                return Ok(ack);
            }
        }
        Err(Self::map_status(status, &body))
    }

    /// Commits a finished upload session to its destination path
    pub async fn commit_upload(
        &self,
        path: &str,
        upload_id: Option<&str>,
    ) -> Result<EntryMetadata, StorageError> {
        let url = self.content_endpoint(&["commit_chunked_upload", &self.config.root, path])?;
        let mut req = self.http.post(url);
        if let Some(id) = upload_id {
            req = req.query(&[("upload_id", id)]);
        }
        let response = self.send(req).await?;
        response
            .json()
            .await
            .context("failed to parse commit response")
            .map_err(StorageError::Transport)
    }
}

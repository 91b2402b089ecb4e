//! HTTP client for the OneDrive REST API
//!
//! Same dispatch discipline as the other adapters: bearer signing, one
//! refresh retry on 401 (bounded loop, at most two attempts), statuses
//! mapped into the shared taxonomy. The scope model differs from the
//! path-addressed backend: a 403 here means the granted scope is narrower
//! than the operation needs.

use std::sync::Arc;

use anyhow::Context;
use futures_util::TryStreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use unidrive_core::provider::ContentStream;
use unidrive_core::{StorageError, TokenSource};

use crate::api::{ApiError, DriveInfo, DriveItem, Listing};
use crate::config::OneDriveConfig;

/// Maximum attempts per request: the original try plus one refresh retry
const MAX_AUTH_ATTEMPTS: u32 = 2;

pub(crate) struct OneDriveClient {
    http: reqwest::Client,
    config: OneDriveConfig,
    tokens: Arc<dyn TokenSource>,
}

impl OneDriveClient {
    pub fn new(
        http: reqwest::Client,
        config: OneDriveConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            config,
            tokens,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.config.api_base)
            .with_context(|| format!("invalid base URL {:?}", self.config.api_base))
            .map_err(StorageError::Transport)?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| StorageError::transport("base URL cannot carry paths"))?;
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    /// Sends a request with bearer signing and the single refresh retry
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

    async fn send(&self, req: RequestBuilder) -> Result<Response, StorageError> {
        let response = self.dispatch(req).await?;
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
            403 => StorageError::InsufficientPermissions(message),
            404 => StorageError::NotFound(message),
            409 => StorageError::Conflict(message),
            code if (500..600).contains(&code) => StorageError::ProviderUnavailable {
                status: code,
                message,
            },
            code => StorageError::Transport(anyhow::anyhow!("unexpected status {code}: {message}")),
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, StorageError> {
        response
            .json()
            .await
            .with_context(|| format!("failed to parse {what}"))
            .map_err(StorageError::Transport)
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    pub async fn drive_info(&self) -> Result<DriveInfo, StorageError> {
        let url = self.endpoint(&["drive"])?;
        let response = self.send(self.http.get(url)).await?;
        Self::json(response, "drive info").await
    }

    pub async fn item(&self, id: &str) -> Result<DriveItem, StorageError> {
        let url = self.endpoint(&["drive", "items", id])?;
        let response = self.send(self.http.get(url)).await?;
        Self::json(response, "item metadata").await
    }

    pub async fn children(&self, id: &str) -> Result<Listing, StorageError> {
        let url = self.endpoint(&["drive", "items", id, "children"])?;
        let response = self.send(self.http.get(url)).await?;
        Self::json(response, "directory listing").await
    }

    pub async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<DriveItem, StorageError> {
        let url = self.endpoint(&["drive", "items", parent_id, "children"])?;
        let req = self
            .http
            .post(url)
            .json(&serde_json::json!({ "name": name, "type": "folder" }));
        let response = self.send(req).await?;
        Self::json(response, "create_folder response").await
    }

    pub async fn upload(
        &self,
        parent_id: &str,
        name: &str,
        body: reqwest::Body,
    ) -> Result<DriveItem, StorageError> {
        let url = self.endpoint(&["drive", "items", parent_id, "children", name, "content"])?;
        let req = self
            .http
            .put(url)
            .header("Content-Type", "application/octet-stream")
            .body(body);
        let response = self.send(req).await?;
        Self::json(response, "upload response").await
    }

    pub async fn rename(&self, id: &str, new_name: &str) -> Result<DriveItem, StorageError> {
        let url = self.endpoint(&["drive", "items", id])?;
        let req = self
            .http
            .patch(url)
            .json(&serde_json::json!({ "name": new_name }));
        let response = self.send(req).await?;
        Self::json(response, "rename response").await
    }

    pub async fn move_entry(
        &self,
        id: &str,
        destination_id: &str,
    ) -> Result<DriveItem, StorageError> {
        let url = self.endpoint(&["drive", "items", id, "move"])?;
        let req = self
            .http
            .post(url)
            .json(&serde_json::json!({ "destination": destination_id }));
        let response = self.send(req).await?;
        Self::json(response, "move response").await
    }

    pub async fn copy_entry(
        &self,
        id: &str,
        destination_id: &str,
    ) -> Result<DriveItem, StorageError> {
        let url = self.endpoint(&["drive", "items", id, "copy"])?;
        let req = self
            .http
            .post(url)
            .json(&serde_json::json!({ "destination": destination_id }));
        let response = self.send(req).await?;
        Self::json(response, "copy response").await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let url = self.endpoint(&["drive", "items", id])?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    pub async fn download(&self, id: &str) -> Result<ContentStream, StorageError> {
        let url = self.endpoint(&["drive", "items", id, "content"])?;
        let response = self.send(self.http.get(url)).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(stream)))
    }
}

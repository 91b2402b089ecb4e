//! Wire types for the Dropbox REST API (JSON deserialization)

use serde::Deserialize;

/// Metadata for a single file or folder
///
/// Folders carry a listing `hash` (changes whenever the listing changes);
/// files carry a `rev`. Either serves as the change-detection marker.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryMetadata {
    /// Display-cased path of the entry ("/" for the root)
    pub path: String,
    /// True for folders
    #[serde(default)]
    pub is_dir: bool,
    /// Size in bytes (0 for folders)
    #[serde(default)]
    pub bytes: u64,
    /// Listing hash, folders only
    #[serde(default)]
    pub hash: Option<String>,
    /// Content revision, files only
    #[serde(default)]
    pub rev: Option<String>,
}

impl EntryMetadata {
    /// The change-detection marker: listing hash for folders, rev for files
    pub fn marker(&self) -> Option<String> {
        self.hash.clone().or_else(|| self.rev.clone())
    }

    /// Display name: final path segment, `None` for the root path
    pub fn display_name(&self) -> Option<&str> {
        if self.path == "/" {
            return None;
        }
        self.path.rsplit('/').next()
    }
}

/// One page of the `/delta` change feed
///
/// Each entry is a `[path, metadata]` pair; a `null` metadata means the
/// path no longer exists. The cursor in a page acknowledges everything up
/// to that page and must never be replayed.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaPage {
    /// Ordered change entries
    #[serde(default)]
    pub entries: Vec<(String, Option<EntryMetadata>)>,
    /// Cursor to send with the next request
    pub cursor: String,
    /// More pages are immediately available
    #[serde(default)]
    pub has_more: bool,
    /// Local state is unreconcilable and must be rebuilt from scratch
    #[serde(default)]
    pub reset: bool,
}

/// Response from the account-info endpoint
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub quota_info: QuotaInfo,
}

/// Quota block of the account-info response
#[derive(Debug, Deserialize)]
pub struct QuotaInfo {
    /// Total storage in bytes
    pub quota: u64,
}

/// Acknowledgement for one chunk of a resumable upload session
///
/// `offset` is the number of bytes the server has durably accepted for
/// this session; the client resumes from exactly there.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkAck {
    /// Session identifier, issued on the first accepted chunk
    pub upload_id: String,
    /// Total bytes the server has accepted so far
    pub offset: u64,
}

/// Error body shape: `{"error": "..."}` (or an object with a message)
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: serde_json::Value,
}

impl ApiError {
    /// Best-effort extraction of a human-readable message from a body
    pub fn message_from(body: &str) -> Option<String> {
        let parsed: ApiError = serde_json::from_str(body).ok()?;
        match parsed.error {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

//! Wire types for the OneDrive REST API (JSON deserialization)

use serde::Deserialize;

/// Metadata for a single drive item
///
/// Identity is the opaque `id`; the `type` string distinguishes folders
/// (and photo albums, which behave as folders) from files.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveItem {
    /// Opaque item identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Item kind: "file", "folder" or "album"
    #[serde(rename = "type")]
    pub item_type: String,
    /// Size in bytes (0 for folders)
    #[serde(default)]
    pub size: u64,
}

impl DriveItem {
    /// Albums are directories for every purpose of the tree
    pub fn is_folder(&self) -> bool {
        matches!(self.item_type.as_str(), "folder" | "album")
    }
}

/// A directory listing: `{"value": [items]}`
#[derive(Debug, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub value: Vec<DriveItem>,
}

/// Response from the drive endpoint
#[derive(Debug, Deserialize)]
pub struct DriveInfo {
    pub quota: QuotaFacet,
}

/// Quota block of the drive response
#[derive(Debug, Deserialize)]
pub struct QuotaFacet {
    /// Total storage in bytes
    pub total: u64,
}

/// Error body shape: `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

/// Inner error object
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiError {
    /// Best-effort extraction of `message (code)` from an error body
    pub fn message_from(body: &str) -> Option<String> {
        let parsed: ApiError = serde_json::from_str(body).ok()?;
        match (parsed.error.message, parsed.error.code) {
            (Some(message), Some(code)) => Some(format!("{message} ({code})")),
            (Some(message), None) => Some(message),
            (None, Some(code)) => Some(code),
            (None, None) => None,
        }
    }
}

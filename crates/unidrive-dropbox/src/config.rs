//! Configuration for the Dropbox adapter

use serde::{Deserialize, Serialize};

/// Default base URL for metadata/fileops endpoints
const API_BASE: &str = "https://api.dropbox.com/1";

/// Default base URL for content endpoints (download, chunked upload)
const CONTENT_BASE: &str = "https://api-content.dropbox.com/1";

/// Chunk size for resumable uploads: 4 MiB
const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Settings for a Dropbox provider instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropboxConfig {
    /// Base URL for metadata and file-operation endpoints
    pub api_base: String,
    /// Base URL for content endpoints
    pub content_base: String,
    /// Access root ("dropbox" for full access, "sandbox" for app folders)
    pub root: String,
    /// Size of each resumable upload chunk, in bytes
    pub chunk_size: usize,
    /// Display name shown for this provider's tree root
    pub display_name: String,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
            root: "dropbox".to_string(),
            chunk_size: CHUNK_SIZE,
            display_name: "Dropbox".to_string(),
        }
    }
}

impl DropboxConfig {
    /// Points both endpoint bases at one URL (used by tests)
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.content_base = base;
        self
    }

    /// Overrides the resumable upload chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Overrides the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

//! Configuration for the OneDrive adapter

use serde::{Deserialize, Serialize};

/// Default base URL for the OneDrive API
const API_BASE: &str = "https://api.onedrive.com/v1.0";

/// Buffer size for streaming uploads: 4 MiB
const UPLOAD_BUFFER: usize = 4 * 1024 * 1024;

/// Settings for a OneDrive provider instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneDriveConfig {
    /// Base URL for all API endpoints
    pub api_base: String,
    /// Remote id of the drive root item
    pub root_id: String,
    /// Buffer size for the streaming upload copy loop, in bytes
    pub upload_buffer: usize,
    /// Display name shown for this provider's tree root
    pub display_name: String,
}

impl Default for OneDriveConfig {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            root_id: "root".to_string(),
            upload_buffer: UPLOAD_BUFFER,
            display_name: "OneDrive".to_string(),
        }
    }
}

impl OneDriveConfig {
    /// Points the API base at another URL (used by tests)
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Overrides the upload copy buffer size
    pub fn with_upload_buffer(mut self, bytes: usize) -> Self {
        self.upload_buffer = bytes;
        self
    }

    /// Overrides the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

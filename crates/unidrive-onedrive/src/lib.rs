//! unidrive OneDrive adapter
//!
//! Implements the [`StorageProvider`](unidrive_core::StorageProvider)
//! contract against the OneDrive REST API:
//!
//! - id-addressed entries (opaque remote identifiers)
//! - lazy refresh: directory listings are replaced wholesale when the
//!   caller navigates into them; there is no incremental change feed
//! - streaming uploads with per-buffer progress and cancellation
//!
//! ## Modules
//!
//! - [`config`] - endpoints, root id, display name
//! - [`provider`] - the `StorageProvider` implementation
//! - `api` / `client` - wire types and HTTP dispatch

pub mod config;
pub mod provider;

mod api;
mod client;

pub use config::OneDriveConfig;
pub use provider::OneDriveProvider;

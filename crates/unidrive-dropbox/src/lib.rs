//! unidrive Dropbox adapter
//!
//! Implements the [`StorageProvider`](unidrive_core::StorageProvider)
//! contract against the Dropbox REST API:
//!
//! - incremental synchronization through the `/delta` cursor feed
//! - path-addressed entries (remote identity derived from the tree)
//! - chunked resumable uploads with server-authoritative offsets
//!
//! ## Modules
//!
//! - [`config`] - endpoints, chunk size, display name
//! - [`provider`] - the `StorageProvider` implementation
//! - `api` / `client` / `sync` / `upload` - wire types, HTTP dispatch,
//!   delta reconciliation and the upload session protocol

pub mod config;
pub mod provider;

mod api;
mod client;
mod sync;
mod upload;

pub use config::DropboxConfig;
pub use provider::DropboxProvider;

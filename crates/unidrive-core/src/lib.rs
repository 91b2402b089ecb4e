//! unidrive core - one virtual file tree over heterogeneous cloud backends
//!
//! This crate contains the backend-independent half of unidrive:
//!
//! - **File graph** - arena-backed virtual tree shared by all backends
//! - **Provider port** - the [`StorageProvider`] contract each backend
//!   satisfies, plus the [`TokenSource`] credential boundary
//! - **Node facade** - [`NodeRef`], the unit all operations act on, with
//!   the cross-provider transfer orchestrator built in
//! - **Sync coordinator** - [`DriveManager`], fanning synchronization out
//!   across providers and guarding against overlapping cycles
//! - **Snapshot** - save/restore of the whole tree and provider state
//!
//! Backend adapters live in sibling crates; the delta-cursor and the
//! lazy-refresh synchronization styles both fit behind the same port.

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod manager;
pub mod node;
pub mod provider;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::{StaticToken, TokenSource};
pub use config::Config;
pub use error::StorageError;
pub use graph::{name_key, validate_name, Entry, FileGraph, Node, NodeId, SharedGraph};
pub use manager::{DriveManager, SyncReport};
pub use node::NodeRef;
pub use provider::{ContentStream, ProgressFn, StorageProvider};
pub use snapshot::{ManagerSnapshot, ProviderState};

//! Snapshot persistence - save and restore the whole provider set
//!
//! The entire virtual tree plus per-provider state (cursor, quota, name) is
//! serializable as one JSON document. Node identity - parent/child ids and
//! provider-specific fields - round-trips exactly.
//!
//! Restoration is factory-driven: the core cannot know which backend crate
//! a `kind` tag belongs to, so callers supply a closure that turns each
//! [`ProviderState`] back into a provider. Restored providers are adopted
//! without re-running `load_info` (their state is already loaded); callers
//! may `synchronize()` afterwards to freshen.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StorageError;
use crate::manager::DriveManager;
use crate::provider::StorageProvider;

/// One provider's serialized state, tagged for factory routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    /// Backend tag, as reported by `StorageProvider::kind`
    pub kind: String,
    /// Display name of the provider instance
    pub name: String,
    /// Backend-defined state document (tree, cursor, quota, ...)
    pub state: serde_json::Value,
}

/// Serialized form of a [`DriveManager`] and its providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    /// Provider states in load order
    pub providers: Vec<ProviderState>,
    /// Whether periodic synchronization was enabled
    pub auto_sync: bool,
}

impl ManagerSnapshot {
    /// Writes the snapshot as JSON to a file
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let file = std::fs::File::create(path)
            .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;
        serde_json::to_writer(file, self)
            .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;
        info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Reads a snapshot back from a JSON file
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let file = std::fs::File::open(path)
            .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;
        serde_json::from_reader(file).map_err(|e| StorageError::Transport(anyhow::Error::new(e)))
    }
}

impl DriveManager {
    /// Captures the current provider set as a snapshot
    pub fn snapshot(&self) -> Result<ManagerSnapshot, StorageError> {
        let mut providers = Vec::new();
        for provider in self.providers() {
            providers.push(ProviderState {
                kind: provider.kind().to_string(),
                name: provider.name(),
                state: provider.export_state()?,
            });
        }
        Ok(ManagerSnapshot {
            providers,
            auto_sync: self.auto_sync(),
        })
    }

    /// Rebuilds a manager from a snapshot via a backend factory
    ///
    /// The factory receives each [`ProviderState`] and returns the restored
    /// provider; an unknown `kind` should fail there. Providers are adopted
    /// in snapshot order, preserving load order.
    pub fn restore_with<F>(snapshot: &ManagerSnapshot, factory: F) -> Result<Self, StorageError>
    where
        F: Fn(&ProviderState) -> Result<Arc<dyn StorageProvider>, StorageError>,
    {
        let manager = DriveManager::new();
        for state in &snapshot.providers {
            manager.adopt(factory(state)?);
        }
        manager.set_auto_sync(snapshot.auto_sync);
        Ok(manager)
    }
}

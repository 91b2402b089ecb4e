//! Sync coordinator - holds the loaded providers and drives synchronization
//!
//! [`DriveManager`] owns an ordered list of providers (insertion order =
//! load order). `load` runs the provider's `load_info` and appends it only
//! on success; nothing ever removes a provider automatically.
//!
//! `synchronize` fans out across all providers concurrently; each provider
//! synchronizes independently and one failure never prevents or rolls back
//! another. A gate ensures two synchronization cycles never overlap: the
//! periodic path skips a cycle while one is running and re-arms only after
//! it completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::provider::StorageProvider;

/// Outcome of one provider's part of a synchronization cycle
#[derive(Debug)]
pub struct SyncReport {
    /// Display name of the provider
    pub provider: String,
    /// The provider's synchronization result
    pub result: Result<(), StorageError>,
}

/// Coordinates a set of loaded storage providers
#[derive(Default)]
pub struct DriveManager {
    providers: RwLock<Vec<Arc<dyn StorageProvider>>>,
    auto_sync: AtomicBool,
    sync_gate: tokio::sync::Mutex<()>,
}

impl DriveManager {
    /// Creates an empty coordinator with periodic sync disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a provider: runs `load_info`, then appends it to the list
    ///
    /// A `load_info` failure propagates and the provider is not added.
    pub async fn load(&self, provider: Arc<dyn StorageProvider>) -> Result<(), StorageError> {
        provider.load_info().await?;
        info!(provider = provider.name(), "provider loaded");
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(provider);
        Ok(())
    }

    /// Appends an already-loaded provider (snapshot restoration path)
    ///
    /// The provider's state must have been populated by other means;
    /// `load_info` is not invoked.
    pub fn adopt(&self, provider: Arc<dyn StorageProvider>) {
        debug!(provider = provider.name(), "provider adopted from snapshot");
        self.providers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(provider);
    }

    /// The loaded providers, in load order
    pub fn providers(&self) -> Vec<Arc<dyn StorageProvider>> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sum of every provider's last-loaded quota, in bytes
    ///
    /// Values are not re-fetched; they are whatever `load_info` reported.
    pub fn total_quota(&self) -> u64 {
        self.providers().iter().map(|p| p.quota()).sum()
    }

    /// Whether periodic synchronization is enabled
    pub fn auto_sync(&self) -> bool {
        self.auto_sync.load(Ordering::Acquire)
    }

    /// Enables or disables periodic synchronization
    pub fn set_auto_sync(&self, enabled: bool) {
        self.auto_sync.store(enabled, Ordering::Release);
    }

    /// Synchronizes every loaded provider, waiting for a running cycle
    ///
    /// Providers run concurrently and independently; the returned reports
    /// preserve load order.
    pub async fn synchronize(&self) -> Vec<SyncReport> {
        let _guard = self.sync_gate.lock().await;
        self.run_cycle().await
    }

    /// Synchronizes unless a cycle is already running
    ///
    /// Returns `None` when skipped. This is the entry point the periodic
    /// timer uses, so overlapping runs against the same provider set are
    /// impossible.
    pub async fn try_synchronize(&self) -> Option<Vec<SyncReport>> {
        let guard = self.sync_gate.try_lock().ok()?;
        let reports = self.run_cycle().await;
        drop(guard);
        Some(reports)
    }

    async fn run_cycle(&self) -> Vec<SyncReport> {
        let providers = self.providers();
        debug!(count = providers.len(), "starting synchronization cycle");

        let tasks = providers.into_iter().map(|provider| async move {
            let name = provider.name();
            let result = provider.synchronize().await;
            if let Err(err) = &result {
                warn!(provider = name, error = %err, "provider synchronization failed");
            }
            SyncReport {
                provider: name,
                result,
            }
        });
        join_all(tasks).await
    }

    /// Spawns the periodic synchronization driver
    ///
    /// The task sleeps for `interval`, then runs a cycle when auto-sync is
    /// enabled and no cycle is in flight; the next interval starts only
    /// after the cycle completed. The task ends once the manager is
    /// dropped.
    pub fn spawn_auto_sync(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(manager) = weak.upgrade() else { break };
                if !manager.auto_sync() {
                    continue;
                }
                if manager.try_synchronize().await.is_none() {
                    debug!("auto-sync skipped: a synchronization cycle is already running");
                }
            }
        })
    }
}

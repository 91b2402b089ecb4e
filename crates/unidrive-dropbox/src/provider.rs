//! `StorageProvider` implementation for Dropbox
//!
//! Path-addressed: a node's remote identity is its display path, derived
//! from the parent chain - nothing is stored per node beyond the change
//! marker. Synchronization is incremental through the `/delta` cursor
//! feed; navigation verifies the stored marker and falls back to a full
//! resynchronization when the server reports a change.
//!
//! The local tree is only mutated after the server confirmed an operation;
//! the single exception is reconciliation's provisional intermediate
//! directories (see the sync module).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use unidrive_core::graph::{name_key, FileGraph, Node, NodeId, SharedGraph};
use unidrive_core::provider::{ContentStream, ProgressFn, StorageProvider};
use unidrive_core::{StorageError, TokenSource};

use crate::api::EntryMetadata;
use crate::client::DropboxClient;
use crate::config::DropboxConfig;
use crate::{sync, upload};

/// Persistent state captured by snapshots
#[derive(Debug, Serialize, Deserialize)]
struct DropboxState {
    name: String,
    quota: u64,
    cursor: Option<String>,
    graph: FileGraph,
}

/// Dropbox backend adapter (delta-cursor synchronization)
pub struct DropboxProvider {
    config: DropboxConfig,
    http: reqwest::Client,
    tokens: Option<Arc<dyn TokenSource>>,
    tree: SharedGraph,
    cursor: RwLock<Option<String>>,
    quota: AtomicU64,
}

impl DropboxProvider {
    /// Creates a provider from configuration, without credentials
    ///
    /// Operations fail with `NotConfigured` until a token source is
    /// supplied via [`with_token_source`](Self::with_token_source).
    pub fn new(config: DropboxConfig) -> Self {
        let tree = SharedGraph::new(FileGraph::new(&config.display_name));
        Self {
            config,
            http: reqwest::Client::new(),
            tokens: None,
            tree,
            cursor: RwLock::new(None),
            quota: AtomicU64::new(0),
        }
    }

    /// Supplies the credential boundary
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Rebuilds a provider from snapshot state
    ///
    /// The restored instance still needs a token source before it can talk
    /// to the server; its tree, cursor and quota are ready immediately.
    pub fn restore(
        mut config: DropboxConfig,
        state: &serde_json::Value,
    ) -> Result<Self, StorageError> {
        let state: DropboxState = serde_json::from_value(state.clone())
            .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;
        config.display_name = state.name;
        Ok(Self {
            config,
            http: reqwest::Client::new(),
            tokens: None,
            tree: SharedGraph::new(state.graph),
            cursor: RwLock::new(state.cursor),
            quota: AtomicU64::new(state.quota),
        })
    }

    fn client(&self) -> Result<DropboxClient, StorageError> {
        let tokens = self.tokens.clone().ok_or_else(|| {
            StorageError::NotConfigured(
                "no credentials supplied; call with_token_source first".to_string(),
            )
        })?;
        Ok(DropboxClient::new(
            self.http.clone(),
            self.config.clone(),
            tokens,
        ))
    }

    fn cursor_value(&self) -> Option<String> {
        self.cursor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_cursor(&self, cursor: String) {
        *self.cursor.write().unwrap_or_else(|e| e.into_inner()) = Some(cursor);
    }

    /// Appends `name` to a parent path; only the root path ends with `/`
    fn join_path(parent_path: &str, name: &str) -> String {
        if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        }
    }

    /// Fails with `Conflict` when `name` is already taken in `dir`
    ///
    /// The tree's case-insensitive key map is the source of truth: only
    /// this provider knows that the backend normalizes names by case.
    fn ensure_vacant(
        graph: &FileGraph,
        dir: NodeId,
        name: &str,
    ) -> Result<(), StorageError> {
        graph.directory(dir)?;
        if graph.child_by_key(dir, &name_key(name)).is_some() {
            return Err(StorageError::Conflict(format!(
                "an entry named {name:?} is already present in the destination"
            )));
        }
        Ok(())
    }

    fn node_from_metadata(metadata: &EntryMetadata, fallback_name: &str) -> Node {
        let name = metadata.display_name().unwrap_or(fallback_name);
        let mut node = if metadata.is_dir {
            Node::new_directory(name)
        } else {
            Node::new_file(name, metadata.bytes, None)
        };
        node.set_hash(metadata.marker());
        node
    }
}

#[async_trait::async_trait]
impl StorageProvider for DropboxProvider {
    fn name(&self) -> String {
        self.config.display_name.clone()
    }

    fn quota(&self) -> u64 {
        self.quota.load(Ordering::Relaxed)
    }

    fn kind(&self) -> &'static str {
        "dropbox"
    }

    fn tree(&self) -> SharedGraph {
        self.tree.clone()
    }

    async fn load_info(&self) -> Result<(), StorageError> {
        let client = self.client()?;

        let account = client.account_info().await?;
        self.quota
            .store(account.quota_info.quota, Ordering::Relaxed);
        info!(
            provider = self.config.display_name,
            quota = account.quota_info.quota,
            "account info loaded"
        );

        let metadata = client.metadata("/", false, None).await?.ok_or_else(|| {
            StorageError::transport("root metadata request reported not-modified without a marker")
        })?;
        {
            let mut graph = self.tree.write();
            let root = graph.root();
            sync::apply_metadata(&mut graph, root, &self.config.display_name, &metadata);
        }

        self.synchronize().await
    }

    async fn navigated_to(&self, node: NodeId) -> Result<(), StorageError> {
        let client = self.client()?;
        let (path, marker) = {
            let graph = self.tree.read();
            let entry = graph.node(node)?;
            (graph.path_of(node), entry.hash().map(str::to_string))
        };

        // A not-modified answer means the marker is current and the cached
        // children can be trusted.
        let Some(metadata) = client.metadata(&path, true, marker.as_deref()).await? else {
            return Ok(());
        };

        debug!(path, "change marker mismatch, resynchronizing");
        {
            let mut graph = self.tree.write();
            sync::apply_metadata(&mut graph, node, &self.config.display_name, &metadata);
        }
        // A marker mismatch means the cursor feed is behind; catch up.
        self.synchronize().await
    }

    async fn synchronize(&self) -> Result<(), StorageError> {
        let client = self.client()?;
        loop {
            let cursor = self.cursor_value();
            let page = client.delta(cursor.as_deref()).await?;
            debug!(
                entries = page.entries.len(),
                has_more = page.has_more,
                reset = page.reset,
                "delta page received"
            );

            {
                let mut graph = self.tree.write();
                if page.reset {
                    let root = graph.root();
                    graph.clear_children(root)?;
                }
                // Each page is self-contained: advance the cursor even
                // mid-loop so an acknowledged page is never replayed.
                self.set_cursor(page.cursor.clone());
                sync::apply_entries(&mut graph, &self.config.display_name, &page.entries);
            }

            if !page.has_more {
                return Ok(());
            }
        }
    }

    async fn create_folder(&self, parent: NodeId, name: &str) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let path = {
            let graph = self.tree.read();
            Self::ensure_vacant(&graph, parent, name)?;
            Self::join_path(&graph.path_of(parent), name)
        };

        let metadata = client.create_folder(&path).await?;

        let mut graph = self.tree.write();
        let node = Self::node_from_metadata(&metadata, name);
        let key = name_key(&node.name);
        graph.insert_child(parent, key, node)
    }

    async fn upload_file(
        &self,
        parent: NodeId,
        name: &str,
        content: ContentStream,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
        size_hint: Option<u64>,
    ) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let dest_path = {
            let graph = self.tree.read();
            Self::ensure_vacant(&graph, parent, name)?;
            Self::join_path(&graph.path_of(parent), name)
        };

        let metadata = upload::upload_chunked(
            &client,
            &dest_path,
            content,
            &cancel,
            progress.as_ref(),
            size_hint,
            self.config.chunk_size,
        )
        .await?;

        let mut graph = self.tree.write();
        let node = Self::node_from_metadata(&metadata, name);
        let key = name_key(&node.name);
        graph.insert_child(parent, key, node)
    }

    async fn download(&self, node: NodeId) -> Result<ContentStream, StorageError> {
        let client = self.client()?;
        let path = {
            let graph = self.tree.read();
            let entry = graph.node(node)?;
            if entry.is_directory() {
                return Err(StorageError::UnsupportedOperation(
                    "downloading a folder is not supported".to_string(),
                ));
            }
            graph.path_of(node)
        };
        client.download(&path).await
    }

    async fn rename(&self, node: NodeId, new_name: &str) -> Result<(), StorageError> {
        let client = self.client()?;
        let (parent, from_path, to_path) = {
            let graph = self.tree.read();
            let entry = graph.node(node)?;
            let parent = entry.parent.ok_or_else(|| {
                StorageError::UnsupportedOperation("the root cannot be renamed".to_string())
            })?;
            if let Some(existing) = graph.child_by_key(parent, &name_key(new_name)) {
                if existing != node {
                    return Err(StorageError::Conflict(format!(
                        "an entry named {new_name:?} is already present"
                    )));
                }
            }
            let from = graph.path_of(node);
            let to = Self::join_path(&graph.path_of(parent), new_name);
            (parent, from, to)
        };

        let metadata = client.move_entry(&from_path, &to_path).await?;

        let mut graph = self.tree.write();
        graph.detach(node)?;
        sync::apply_metadata(&mut graph, node, &self.config.display_name, &metadata);
        let key = name_key(&graph.node(node)?.name);
        graph.attach(node, parent, key)
    }

    async fn move_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let (from_path, to_path) = {
            let graph = self.tree.read();
            let name = graph.node(node)?.name.clone();
            Self::ensure_vacant(&graph, dest_parent, &name)?;
            let from = graph.path_of(node);
            let to = Self::join_path(&graph.path_of(dest_parent), &name);
            (from, to)
        };

        let metadata = client.move_entry(&from_path, &to_path).await?;

        let mut graph = self.tree.write();
        graph.detach(node)?;
        sync::apply_metadata(&mut graph, node, &self.config.display_name, &metadata);
        let key = name_key(&graph.node(node)?.name);
        graph.attach(node, dest_parent, key)?;
        Ok(node)
    }

    async fn copy_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let (name, from_path, to_path) = {
            let graph = self.tree.read();
            let name = graph.node(node)?.name.clone();
            Self::ensure_vacant(&graph, dest_parent, &name)?;
            let from = graph.path_of(node);
            let to = Self::join_path(&graph.path_of(dest_parent), &name);
            (name, from, to)
        };

        let metadata = client.copy_entry(&from_path, &to_path).await?;

        // Clone the cached subtree, then overwrite the clone's root with
        // the fresh server metadata.
        let mut graph = self.tree.write();
        let key = name_key(metadata.display_name().unwrap_or(&name));
        let copy = graph.clone_subtree(node, dest_parent, key)?;
        sync::apply_metadata(&mut graph, copy, &self.config.display_name, &metadata);
        Ok(copy)
    }

    async fn delete_item(&self, node: NodeId) -> Result<(), StorageError> {
        let client = self.client()?;
        let path = {
            let graph = self.tree.read();
            if graph.node(node)?.parent.is_none() {
                return Err(StorageError::UnsupportedOperation(
                    "the root cannot be deleted".to_string(),
                ));
            }
            graph.path_of(node)
        };

        client.delete_entry(&path).await?;
        self.tree.write().remove_subtree(node)
    }

    fn export_state(&self) -> Result<serde_json::Value, StorageError> {
        let state = DropboxState {
            name: self.config.display_name.clone(),
            quota: self.quota(),
            cursor: self.cursor_value(),
            graph: self.tree.read().clone(),
        };
        serde_json::to_value(state).map_err(|e| StorageError::Transport(anyhow::Error::new(e)))
    }
}

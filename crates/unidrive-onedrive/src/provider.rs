//! `StorageProvider` implementation for OneDrive
//!
//! Id-addressed: every node carries the opaque remote id the server
//! assigned, and child maps are keyed by that id. There is no incremental
//! change feed - `synchronize` is a no-op and a directory's contents are
//! replaced wholesale whenever the caller navigates into it (stale local
//! children not present remotely are dropped).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use unidrive_core::graph::{FileGraph, Node, NodeId, SharedGraph};
use unidrive_core::provider::{ContentStream, ProgressFn, StorageProvider};
use unidrive_core::{StorageError, TokenSource};

use crate::api::DriveItem;
use crate::client::OneDriveClient;
use crate::config::OneDriveConfig;

/// Persistent state captured by snapshots
#[derive(Debug, Serialize, Deserialize)]
struct OneDriveState {
    name: String,
    quota: u64,
    graph: FileGraph,
}

/// OneDrive backend adapter (lazy listing refresh)
pub struct OneDriveProvider {
    config: OneDriveConfig,
    http: reqwest::Client,
    tokens: Option<Arc<dyn TokenSource>>,
    tree: SharedGraph,
    quota: AtomicU64,
}

impl OneDriveProvider {
    /// Creates a provider from configuration, without credentials
    ///
    /// Operations fail with `NotConfigured` until a token source is
    /// supplied via [`with_token_source`](Self::with_token_source).
    pub fn new(config: OneDriveConfig) -> Self {
        let mut graph = FileGraph::new(&config.display_name);
        let root = graph.root();
        if let Some(node) = graph.get_mut(root) {
            node.remote_id = Some(config.root_id.clone());
        }
        Self {
            config,
            http: reqwest::Client::new(),
            tokens: None,
            tree: SharedGraph::new(graph),
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
    /// to the server; its tree and quota are ready immediately.
    pub fn restore(
        mut config: OneDriveConfig,
        state: &serde_json::Value,
    ) -> Result<Self, StorageError> {
        let state: OneDriveState = serde_json::from_value(state.clone())
            .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;
        config.display_name = state.name;
        Ok(Self {
            config,
            http: reqwest::Client::new(),
            tokens: None,
            tree: SharedGraph::new(state.graph),
            quota: AtomicU64::new(state.quota),
        })
    }

    fn client(&self) -> Result<OneDriveClient, StorageError> {
        let tokens = self.tokens.clone().ok_or_else(|| {
            StorageError::NotConfigured(
                "no credentials supplied; call with_token_source first".to_string(),
            )
        })?;
        Ok(OneDriveClient::new(
            self.http.clone(),
            self.config.clone(),
            tokens,
        ))
    }

    /// The remote id a node is addressed by
    fn remote_id(graph: &FileGraph, node: NodeId) -> Result<String, StorageError> {
        graph
            .node(node)?
            .remote_id
            .clone()
            .ok_or_else(|| StorageError::transport("node carries no remote identity"))
    }

    fn node_from_item(item: &DriveItem) -> Node {
        let mut node = if item.is_folder() {
            Node::new_directory(&item.name)
        } else {
            Node::new_file(&item.name, item.size, None)
        };
        node.remote_id = Some(item.id.clone());
        node
    }

    /// Applies server-confirmed metadata to an existing node in place
    fn apply_item(graph: &mut FileGraph, node: NodeId, item: &DriveItem) {
        if let Some(entry) = graph.get_mut(node) {
            if item.is_folder() {
                entry.make_directory();
            } else {
                entry.make_file(item.size);
            }
            entry.name = item.name.clone();
            entry.remote_id = Some(item.id.clone());
        }
    }

    /// Fails with `Conflict` when a child with this display name exists
    fn ensure_name_vacant(
        graph: &FileGraph,
        dir: NodeId,
        name: &str,
    ) -> Result<(), StorageError> {
        graph.directory(dir)?;
        if graph.child_by_name(dir, name).is_some() {
            return Err(StorageError::Conflict(format!(
                "an entry named {name:?} is already present in the destination"
            )));
        }
        Ok(())
    }

    /// Wraps content into a request body that observes cancellation and
    /// reports progress once per copied buffer
    fn streaming_body(
        content: ContentStream,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
        total: Option<u64>,
        buffer_size: usize,
    ) -> reqwest::Body {
        let buffer_size = buffer_size.max(1);
        let stream = futures_util::stream::try_unfold(
            (content, cancel, progress, 0u64),
            move |(mut content, cancel, progress, sent)| async move {
                if cancel.is_cancelled() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "upload cancelled",
                    ));
                }
                let mut buffer = vec![0u8; buffer_size];
                let read = content.read(&mut buffer).await?;
                if read == 0 {
                    return Ok(None);
                }
                buffer.truncate(read);
                let sent = sent + read as u64;
                if let (Some(report), Some(total)) = (progress.as_ref(), total) {
                    if total > 0 {
                        let pct = (sent.saturating_mul(100) / total).min(100) as u8;
                        report(pct);
                    }
                }
                Ok(Some((buffer, (content, cancel, progress, sent))))
            },
        );
        reqwest::Body::wrap_stream(stream)
    }
}

#[async_trait::async_trait]
impl StorageProvider for OneDriveProvider {
    fn name(&self) -> String {
        self.config.display_name.clone()
    }

    fn quota(&self) -> u64 {
        self.quota.load(Ordering::Relaxed)
    }

    fn kind(&self) -> &'static str {
        "onedrive"
    }

    fn tree(&self) -> SharedGraph {
        self.tree.clone()
    }

    async fn load_info(&self) -> Result<(), StorageError> {
        let client = self.client()?;

        let drive = client.drive_info().await?;
        self.quota.store(drive.quota.total, Ordering::Relaxed);
        info!(
            provider = self.config.display_name,
            quota = drive.quota.total,
            "drive info loaded"
        );

        // The configured root id may be an alias; the server's canonical id
        // replaces it so later requests address the root directly.
        let item = client.item(&self.config.root_id).await?;
        {
            let mut graph = self.tree.write();
            let root = graph.root();
            if let Some(node) = graph.get_mut(root) {
                node.remote_id = Some(item.id.clone());
                node.make_directory();
            }
        }

        self.synchronize().await
    }

    async fn navigated_to(&self, node: NodeId) -> Result<(), StorageError> {
        let (is_directory, id) = {
            let graph = self.tree.read();
            let entry = graph.node(node)?;
            (entry.is_directory(), entry.remote_id.clone())
        };
        // Only directories have listings to refresh.
        if !is_directory {
            return Ok(());
        }
        let id = id.ok_or_else(|| StorageError::transport("node carries no remote identity"))?;

        let client = self.client()?;
        let listing = client.children(&id).await?;
        debug!(id, entries = listing.value.len(), "replacing directory listing");

        // Full overwrite, not a merge: stale children disappear with the
        // old map.
        let mut graph = self.tree.write();
        graph.clear_children(node)?;
        for item in &listing.value {
            let child = Self::node_from_item(item);
            graph.insert_child(node, item.id.clone(), child)?;
        }
        Ok(())
    }

    async fn synchronize(&self) -> Result<(), StorageError> {
        // No incremental change feed; directories refresh on navigation.
        trace!("synchronize is a no-op for this backend");
        Ok(())
    }

    async fn create_folder(&self, parent: NodeId, name: &str) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let parent_id = {
            let graph = self.tree.read();
            Self::ensure_name_vacant(&graph, parent, name)?;
            Self::remote_id(&graph, parent)?
        };

        let item = client.create_folder(&parent_id, name).await?;

        let mut graph = self.tree.write();
        graph.insert_child(parent, item.id.clone(), Self::node_from_item(&item))
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
        let parent_id = {
            let graph = self.tree.read();
            Self::ensure_name_vacant(&graph, parent, name)?;
            Self::remote_id(&graph, parent)?
        };

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let body = Self::streaming_body(
            content,
            cancel.clone(),
            progress,
            size_hint,
            self.config.upload_buffer,
        );
        let item = match client.upload(&parent_id, name, body).await {
            Ok(item) => item,
            // The body stream aborts the request when the token fires
            // mid-transfer; surface that as a cancellation.
            Err(_) if cancel.is_cancelled() => return Err(StorageError::Cancelled),
            Err(err) => return Err(err),
        };

        let mut graph = self.tree.write();
        graph.insert_child(parent, item.id.clone(), Self::node_from_item(&item))
    }

    async fn download(&self, node: NodeId) -> Result<ContentStream, StorageError> {
        let client = self.client()?;
        let id = {
            let graph = self.tree.read();
            let entry = graph.node(node)?;
            if entry.is_directory() {
                return Err(StorageError::UnsupportedOperation(
                    "downloading a folder is not supported".to_string(),
                ));
            }
            Self::remote_id(&graph, node)?
        };
        client.download(&id).await
    }

    async fn rename(&self, node: NodeId, new_name: &str) -> Result<(), StorageError> {
        let client = self.client()?;
        let id = {
            let graph = self.tree.read();
            Self::remote_id(&graph, node)?
        };

        // Children are keyed by id, so a rename never rekeys the parent map.
        let item = client.rename(&id, new_name).await?;

        let mut graph = self.tree.write();
        Self::apply_item(&mut graph, node, &item);
        Ok(())
    }

    async fn move_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let (id, dest_id) = {
            let graph = self.tree.read();
            graph.directory(dest_parent)?;
            let id = Self::remote_id(&graph, node)?;
            // Identity is the opaque id: the destination conflicts when it
            // already lists this very item.
            if graph.child_by_key(dest_parent, &id).is_some() {
                return Err(StorageError::Conflict(
                    "the item is already present in the destination".to_string(),
                ));
            }
            (id, Self::remote_id(&graph, dest_parent)?)
        };

        let item = client.move_entry(&id, &dest_id).await?;

        let mut graph = self.tree.write();
        graph.detach(node)?;
        Self::apply_item(&mut graph, node, &item);
        graph.attach(node, dest_parent, item.id.clone())?;
        Ok(node)
    }

    async fn copy_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError> {
        let client = self.client()?;
        let (id, dest_id) = {
            let graph = self.tree.read();
            graph.directory(dest_parent)?;
            let id = Self::remote_id(&graph, node)?;
            if graph.child_by_key(dest_parent, &id).is_some() {
                return Err(StorageError::Conflict(
                    "the item is already present in the destination".to_string(),
                ));
            }
            (id, Self::remote_id(&graph, dest_parent)?)
        };

        // The server assigns the copy a fresh identity; clone the cached
        // subtree and overwrite its root with the confirmed metadata.
        let item = client.copy_entry(&id, &dest_id).await?;

        let mut graph = self.tree.write();
        let copy = graph.clone_subtree(node, dest_parent, item.id.clone())?;
        Self::apply_item(&mut graph, copy, &item);
        Ok(copy)
    }

    async fn delete_item(&self, node: NodeId) -> Result<(), StorageError> {
        let client = self.client()?;
        let id = {
            let graph = self.tree.read();
            if graph.node(node)?.parent.is_none() {
                return Err(StorageError::UnsupportedOperation(
                    "the root cannot be deleted".to_string(),
                ));
            }
            Self::remote_id(&graph, node)?
        };

        client.delete(&id).await?;
        self.tree.write().remove_subtree(node)
    }

    fn export_state(&self) -> Result<serde_json::Value, StorageError> {
        let state = OneDriveState {
            name: self.config.display_name.clone(),
            quota: self.quota(),
            graph: self.tree.read().clone(),
        };
        serde_json::to_value(state).map_err(|e| StorageError::Transport(anyhow::Error::new(e)))
    }
}

//! Node facade and cross-provider transfer orchestration
//!
//! [`NodeRef`] is the unit all file operations act on: a node id paired
//! with the provider that owns it. Reads go straight to the shared graph;
//! mutations validate locally (name legality, read-only, directory-ness)
//! and then delegate to the provider, which performs the remote call and
//! updates the tree on success.
//!
//! `move_to`/`copy_to` embed the transfer orchestrator: when source and
//! destination share a provider the native operation is used; otherwise a
//! file is streamed from the source provider into an upload on the
//! destination provider, and a move deletes the source only after the
//! destination upload succeeded. Directories never cross providers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StorageError;
use crate::graph::{validate_name, NodeId};
use crate::provider::{ContentStream, ProgressFn, StorageProvider};

/// A node in the unified virtual tree, bound to its owning provider
#[derive(Clone)]
pub struct NodeRef {
    provider: Arc<dyn StorageProvider>,
    id: NodeId,
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("provider", &self.provider.name())
            .field("id", &self.id)
            .finish()
    }
}

impl NodeRef {
    /// The root node of a provider's tree
    pub fn root(provider: Arc<dyn StorageProvider>) -> Self {
        let id = provider.tree().read().root();
        Self { provider, id }
    }

    /// Binds an existing node id to its provider
    pub fn new(provider: Arc<dyn StorageProvider>, id: NodeId) -> Self {
        Self { provider, id }
    }

    /// The node id within the owning provider's graph
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The provider owning this node
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// True when both refs point at the same node of the same provider
    pub fn same_node(&self, other: &NodeRef) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.provider, &other.provider)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Display name; fails when the id went stale
    pub fn name(&self) -> Result<String, StorageError> {
        Ok(self.provider.tree().read().node(self.id)?.name.clone())
    }

    /// True when this node is a directory
    pub fn is_directory(&self) -> Result<bool, StorageError> {
        Ok(self.provider.tree().read().node(self.id)?.is_directory())
    }

    /// File size in bytes (0 for directories)
    pub fn size(&self) -> Result<u64, StorageError> {
        Ok(self.provider.tree().read().node(self.id)?.size())
    }

    /// True when delete/move are blocked on this node
    pub fn read_only(&self) -> Result<bool, StorageError> {
        Ok(self.provider.tree().read().node(self.id)?.read_only)
    }

    /// Display path from the provider root
    pub fn path(&self) -> String {
        self.provider.tree().read().path_of(self.id)
    }

    /// Immediate children, in child-map order
    pub fn children(&self) -> Result<Vec<NodeRef>, StorageError> {
        let tree = self.provider.tree();
        let graph = tree.read();
        let node = graph.node(self.id)?;
        let ids: Vec<NodeId> = node
            .children()
            .map(|c| c.values().copied().collect())
            .unwrap_or_default();
        Ok(ids
            .into_iter()
            .map(|id| NodeRef::new(self.provider.clone(), id))
            .collect())
    }

    /// Linear scan of the immediate children by display name
    ///
    /// Directories only; returns `None` for files and missing names.
    pub fn find(&self, name: &str) -> Option<NodeRef> {
        let tree = self.provider.tree();
        let graph = tree.read();
        graph
            .child_by_name(self.id, name)
            .map(|id| NodeRef::new(self.provider.clone(), id))
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Walks a relative path, notifying the provider at each directory
    ///
    /// Splits on `/` and `\`, skips empty segments, and compares names
    /// case-insensitively. Before each directory's cached children are
    /// consulted the provider's `navigated_to` hook runs, giving lazy
    /// backends the chance to repopulate stale contents. Returns `None`
    /// as soon as a segment is missing.
    pub async fn navigate(&self, rel_path: &str) -> Result<Option<NodeRef>, StorageError> {
        if rel_path.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "relative path must not be empty".to_string(),
            ));
        }
        let mut current = self.clone();
        for segment in rel_path.split(['/', '\\']).filter(|s| !s.is_empty()) {
            current.provider.navigated_to(current.id).await?;
            let next = {
                let tree = current.provider.tree();
                let graph = tree.read();
                graph.child_by_name(current.id, segment)
            };
            match next {
                Some(id) => current = NodeRef::new(current.provider.clone(), id),
                None => {
                    debug!(segment, "navigation stopped at missing segment");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    /// Notifies the provider that the caller entered this node
    pub async fn navigated(&self) -> Result<(), StorageError> {
        self.provider.navigated_to(self.id).await
    }

    // ------------------------------------------------------------------
    // Mutations (validate locally, delegate to the provider)
    // ------------------------------------------------------------------

    /// Ensures this node is a writable directory
    fn check_writable_directory(&self) -> Result<(), StorageError> {
        let tree = self.provider.tree();
        let graph = tree.read();
        let node = graph.node(self.id)?;
        if !node.is_directory() {
            return Err(StorageError::NotADirectory(node.name.clone()));
        }
        if node.read_only {
            return Err(StorageError::ReadOnly(node.name.clone()));
        }
        Ok(())
    }

    /// Creates a folder in this directory
    pub async fn create_folder(&self, name: &str) -> Result<NodeRef, StorageError> {
        let name = validate_name(name)?;
        self.check_writable_directory()?;
        let id = self.provider.create_folder(self.id, &name).await?;
        Ok(NodeRef::new(self.provider.clone(), id))
    }

    /// Uploads a file into this directory
    ///
    /// Progress reporting needs the total length: supplying a progress sink
    /// without `size_hint` is a local validation error, raised before any
    /// remote call.
    pub async fn upload(
        &self,
        name: &str,
        content: ContentStream,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
        size_hint: Option<u64>,
    ) -> Result<NodeRef, StorageError> {
        let name = validate_name(name)?;
        self.check_writable_directory()?;
        if progress.is_some() && size_hint.is_none() {
            return Err(StorageError::InvalidArgument(
                "progress reporting requires a size hint".to_string(),
            ));
        }
        let id = self
            .provider
            .upload_file(self.id, &name, content, cancel, progress, size_hint)
            .await?;
        Ok(NodeRef::new(self.provider.clone(), id))
    }

    /// Opens a download stream for this file
    pub async fn download(&self) -> Result<ContentStream, StorageError> {
        if self.is_directory()? {
            return Err(StorageError::UnsupportedOperation(
                "downloading a directory is not supported".to_string(),
            ));
        }
        self.provider.download(self.id).await
    }

    /// Renames this node
    pub async fn rename(&self, new_name: &str) -> Result<(), StorageError> {
        let new_name = validate_name(new_name)?;
        self.provider.rename(self.id, &new_name).await
    }

    /// Deletes this node (and its subtree, for directories)
    pub async fn delete(&self) -> Result<(), StorageError> {
        if self.read_only()? {
            return Err(StorageError::ReadOnly(self.name()?));
        }
        self.provider.delete_item(self.id).await
    }

    /// Moves this node into `dest`, possibly across providers
    pub async fn move_to(&self, dest: &NodeRef) -> Result<NodeRef, StorageError> {
        if self.read_only()? {
            return Err(StorageError::ReadOnly(self.name()?));
        }
        self.transfer(dest, true).await
    }

    /// Copies this node into `dest`, possibly across providers
    pub async fn copy_to(&self, dest: &NodeRef) -> Result<NodeRef, StorageError> {
        self.transfer(dest, false).await
    }

    // ------------------------------------------------------------------
    // Transfer orchestrator
    // ------------------------------------------------------------------

    /// Decides between a provider-native move/copy and the streamed
    /// download-then-upload fallback
    async fn transfer(&self, dest: &NodeRef, is_move: bool) -> Result<NodeRef, StorageError> {
        dest.check_writable_directory()?;

        if Arc::ptr_eq(&self.provider, &dest.provider) {
            let id = if is_move {
                self.provider.move_item(self.id, dest.id).await?
            } else {
                self.provider.copy_item(self.id, dest.id).await?
            };
            return Ok(NodeRef::new(dest.provider.clone(), id));
        }

        if self.is_directory()? {
            return Err(StorageError::UnsupportedOperation(
                "moving or copying folders between providers is not supported".to_string(),
            ));
        }

        let name = self.name()?;
        let size = self.size()?;
        debug!(
            name,
            size,
            from = self.provider.name(),
            to = dest.provider.name(),
            is_move,
            "cross-provider transfer"
        );

        let stream = self.provider.download(self.id).await?;
        let uploaded = dest
            .provider
            .upload_file(
                dest.id,
                &name,
                stream,
                CancellationToken::new(),
                None,
                Some(size),
            )
            .await?;

        // The source is removed only once the destination holds the file.
        if is_move {
            self.provider.delete_item(self.id).await?;
        }
        Ok(NodeRef::new(dest.provider.clone(), uploaded))
    }
}

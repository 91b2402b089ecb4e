//! In-memory provider used by the core unit tests
//!
//! Implements the full [`StorageProvider`] contract against a local tree
//! and byte store, with a call log and failure switches so tests can assert
//! ordering ("delete only after the upload succeeded") and fast-fail
//! behavior ("conflict before any remote call"). `remote_calls` counts the
//! requests a real backend would have sent, so pre-flight checks can be
//! verified to run before the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::graph::{name_key, FileGraph, Node, NodeId, SharedGraph};
use crate::provider::{ContentStream, ProgressFn, StorageProvider};

pub(crate) struct FakeProvider {
    name: String,
    quota: u64,
    tree: SharedGraph,
    contents: Mutex<HashMap<NodeId, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    remote: AtomicUsize,
    fail_load: AtomicBool,
    fail_sync: AtomicBool,
    fail_upload: AtomicBool,
    sync_delay_ms: AtomicUsize,
}

impl FakeProvider {
    fn build(name: &str, quota: u64) -> Self {
        Self {
            name: name.to_string(),
            quota,
            tree: SharedGraph::new(FileGraph::new(name)),
            contents: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            remote: AtomicUsize::new(0),
            fail_load: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            sync_delay_ms: AtomicUsize::new(0),
        }
    }

    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, 1024 * 1024))
    }

    pub fn with_quota(name: &str, quota: u64) -> Arc<Self> {
        Arc::new(Self::build(name, quota))
    }

    pub fn with_fail_load(self: Arc<Self>) -> Arc<Self> {
        self.fail_load.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_fail_sync(self: Arc<Self>) -> Arc<Self> {
        self.fail_sync.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_fail_upload(self: Arc<Self>) -> Arc<Self> {
        self.fail_upload.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_sync_delay_ms(self: Arc<Self>, ms: usize) -> Arc<Self> {
        self.sync_delay_ms.store(ms, Ordering::SeqCst);
        self
    }

    pub fn from_state(state: &serde_json::Value) -> Result<Arc<Self>, StorageError> {
        let graph: FileGraph = serde_json::from_value(state.clone())
            .map_err(|e| StorageError::Transport(e.into()))?;
        let name = graph
            .get(graph.root())
            .map(|n| n.name.clone())
            .unwrap_or_default();
        let provider = Self::new(&name);
        *provider.tree.write() = graph;
        Ok(provider)
    }

    fn log(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of simulated server requests issued so far
    pub fn remote_calls(&self) -> usize {
        self.remote.load(Ordering::SeqCst)
    }

    fn hit_remote(&self) {
        self.remote.fetch_add(1, Ordering::SeqCst);
    }

    pub fn content_of(&self, id: NodeId) -> Option<Vec<u8>> {
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn add_dir_to_root(&self, name: &str) -> NodeId {
        let root = self.tree.read().root();
        self.add_dir(root, name)
    }

    pub fn add_file_to_root(&self, name: &str, bytes: &[u8]) -> NodeId {
        let root = self.tree.read().root();
        self.add_file(root, name, bytes)
    }

    pub fn add_dir(&self, parent: NodeId, name: &str) -> NodeId {
        self.tree
            .write()
            .insert_child(parent, name_key(name), Node::new_directory(name))
            .expect("seeding directory")
    }

    pub fn add_file(&self, parent: NodeId, name: &str, bytes: &[u8]) -> NodeId {
        let id = self
            .tree
            .write()
            .insert_child(
                parent,
                name_key(name),
                Node::new_file(name, bytes.len() as u64, None),
            )
            .expect("seeding file");
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, bytes.to_vec());
        id
    }

    fn conflict_in(&self, graph: &FileGraph, dir: NodeId, name: &str) -> Result<(), StorageError> {
        if graph.child_by_key(dir, &name_key(name)).is_some() {
            return Err(StorageError::Conflict(format!(
                "an entry named {name:?} is already present"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageProvider for FakeProvider {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn quota(&self) -> u64 {
        self.quota
    }

    fn kind(&self) -> &'static str {
        "fake"
    }

    fn tree(&self) -> SharedGraph {
        self.tree.clone()
    }

    async fn load_info(&self) -> Result<(), StorageError> {
        self.log("load_info");
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StorageError::ProviderUnavailable {
                status: 500,
                message: "load failed".to_string(),
            });
        }
        Ok(())
    }

    async fn navigated_to(&self, node: NodeId) -> Result<(), StorageError> {
        let name = self
            .tree
            .read()
            .get(node)
            .map(|n| n.name.clone())
            .unwrap_or_default();
        self.log(format!("navigated:{name}"));
        Ok(())
    }

    async fn synchronize(&self) -> Result<(), StorageError> {
        self.log("synchronize");
        let delay = self.sync_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay as u64)).await;
        }
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(StorageError::ProviderUnavailable {
                status: 503,
                message: "sync failed".to_string(),
            });
        }
        Ok(())
    }

    async fn create_folder(&self, parent: NodeId, name: &str) -> Result<NodeId, StorageError> {
        self.log("create_folder");
        {
            let graph = self.tree.read();
            graph.directory(parent)?;
            self.conflict_in(&graph, parent, name)?;
        }
        self.hit_remote();
        self.tree
            .write()
            .insert_child(parent, name_key(name), Node::new_directory(name))
    }

    async fn upload_file(
        &self,
        parent: NodeId,
        name: &str,
        mut content: ContentStream,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
        _size_hint: Option<u64>,
    ) -> Result<NodeId, StorageError> {
        self.log("upload_file");
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(StorageError::ProviderUnavailable {
                status: 500,
                message: "upload refused".to_string(),
            });
        }
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        {
            let graph = self.tree.read();
            graph.directory(parent)?;
            self.conflict_in(&graph, parent, name)?;
        }
        self.hit_remote();
        let mut bytes = Vec::new();
        content
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| StorageError::Transport(e.into()))?;
        let id = self.tree.write().insert_child(
            parent,
            name_key(name),
            Node::new_file(name, bytes.len() as u64, None),
        )?;
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, bytes);
        if let Some(report) = progress {
            report(100);
        }
        Ok(id)
    }

    async fn download(&self, node: NodeId) -> Result<ContentStream, StorageError> {
        self.log("download");
        {
            let graph = self.tree.read();
            let entry = graph.node(node)?;
            if entry.is_directory() {
                return Err(StorageError::UnsupportedOperation(
                    "downloading a directory is not supported".to_string(),
                ));
            }
        }
        self.hit_remote();
        let bytes = self.content_of(node).unwrap_or_default();
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    async fn rename(&self, node: NodeId, new_name: &str) -> Result<(), StorageError> {
        self.log("rename");
        let parent = {
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
            parent
        };
        self.hit_remote();
        let mut graph = self.tree.write();
        graph.detach(node)?;
        graph.node_mut(node)?.name = new_name.to_string();
        graph.attach(node, parent, name_key(new_name))
    }

    async fn move_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError> {
        self.log("move_item");
        let name = {
            let graph = self.tree.read();
            let name = graph.node(node)?.name.clone();
            graph.directory(dest_parent)?;
            self.conflict_in(&graph, dest_parent, &name)?;
            name
        };
        self.hit_remote();
        let mut graph = self.tree.write();
        graph.detach(node)?;
        graph.attach(node, dest_parent, name_key(&name))?;
        Ok(node)
    }

    async fn copy_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError> {
        self.log("copy_item");
        let name = {
            let graph = self.tree.read();
            let name = graph.node(node)?.name.clone();
            graph.directory(dest_parent)?;
            self.conflict_in(&graph, dest_parent, &name)?;
            name
        };
        self.hit_remote();
        self.tree
            .write()
            .clone_subtree(node, dest_parent, name_key(&name))
    }

    async fn delete_item(&self, node: NodeId) -> Result<(), StorageError> {
        self.log("delete_item");
        self.hit_remote();
        self.tree.write().remove_subtree(node)?;
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&node);
        Ok(())
    }

    fn export_state(&self) -> Result<serde_json::Value, StorageError> {
        serde_json::to_value(&*self.tree.read()).map_err(|e| StorageError::Transport(e.into()))
    }
}

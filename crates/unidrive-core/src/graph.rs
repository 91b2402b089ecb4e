//! Virtual file graph - arena-backed tree of files and directories
//!
//! Each storage provider owns one [`FileGraph`]: a flat table of [`Node`]
//! values keyed by a stable [`NodeId`]. Directories hold child ids, and a
//! node's parent is an id lookup rather than an owned reference, so subtree
//! cloning is "copy the reachable id-subset with fresh ids" and can never
//! alias the original.
//!
//! Directory-ness is a tagged variant ([`Entry`]), not a presence flag:
//! switching a node between file and directory is an explicit transition
//! that installs or discards the child map.
//!
//! ## Child keys
//!
//! A directory maps *provider-chosen keys* to child ids. A path-addressed
//! backend keys children by lower-cased name; an id-addressed backend keys
//! them by remote id. Name lookups therefore probe the key map first and
//! fall back to a case-insensitive scan over display names, which serves
//! both schemes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Characters that may not appear in an entry name
pub const RESERVED_NAME_CHARS: [char; 9] = ['\\', ':', '?', '*', '<', '>', '"', '|', '/'];

/// Validates and trims a display name
///
/// A legal name is non-empty after trimming and contains none of
/// [`RESERVED_NAME_CHARS`]. Returns the trimmed name.
pub fn validate_name(name: &str) -> Result<String, StorageError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidName(
            "name must not be empty or blank".to_string(),
        ));
    }
    if trimmed.contains(&RESERVED_NAME_CHARS[..]) {
        return Err(StorageError::InvalidName(format!(
            "name {trimmed:?} contains a reserved character"
        )));
    }
    Ok(trimmed.to_string())
}

/// Canonical child-map key for name-keyed backends (trimmed, lower-cased)
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// NodeId
// ============================================================================

/// Stable identifier of a node within one [`FileGraph`]
///
/// Ids are allocated monotonically and never reused for the lifetime of a
/// graph, so a stale id can only miss, never alias a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Entry and Node
// ============================================================================

/// What a node is: a file with content metadata, or a directory with children
///
/// The `hash` on either variant is an opaque content hash / version marker
/// used by backends for change detection; `None` when the backend has not
/// reported one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Entry {
    /// A regular file
    File {
        /// Size in bytes
        size: u64,
        /// Backend-reported content hash / version marker
        hash: Option<String>,
    },
    /// A directory with provider-keyed children
    Directory {
        /// Provider-chosen key to child id
        children: BTreeMap<String, NodeId>,
        /// Backend-reported listing hash / version marker
        hash: Option<String>,
    },
}

/// A single entry in the virtual tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Display name; the provider's display name for the root
    pub name: String,
    /// File or directory payload
    pub entry: Entry,
    /// Parent id; `None` exactly for the graph root
    pub parent: Option<NodeId>,
    /// Blocks delete/move on this node
    pub read_only: bool,
    /// Opaque backend identifier, for id-addressed backends
    pub remote_id: Option<String>,
}

impl Node {
    /// Creates a file node (unattached)
    pub fn new_file(name: impl Into<String>, size: u64, hash: Option<String>) -> Self {
        Self {
            name: name.into(),
            entry: Entry::File { size, hash },
            parent: None,
            read_only: false,
            remote_id: None,
        }
    }

    /// Creates an empty directory node (unattached)
    pub fn new_directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: Entry::Directory {
                children: BTreeMap::new(),
                hash: None,
            },
            parent: None,
            read_only: false,
            remote_id: None,
        }
    }

    /// Returns true when this node is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self.entry, Entry::Directory { .. })
    }

    /// File size in bytes; directories report 0
    pub fn size(&self) -> u64 {
        match self.entry {
            Entry::File { size, .. } => size,
            Entry::Directory { .. } => 0,
        }
    }

    /// Content hash / version marker, if the backend reported one
    pub fn hash(&self) -> Option<&str> {
        match &self.entry {
            Entry::File { hash, .. } | Entry::Directory { hash, .. } => hash.as_deref(),
        }
    }

    /// Replaces the change-detection marker
    pub fn set_hash(&mut self, new_hash: Option<String>) {
        match &mut self.entry {
            Entry::File { hash, .. } | Entry::Directory { hash, .. } => *hash = new_hash,
        }
    }

    /// Child map, when this node is a directory
    pub fn children(&self) -> Option<&BTreeMap<String, NodeId>> {
        match &self.entry {
            Entry::Directory { children, .. } => Some(children),
            Entry::File { .. } => None,
        }
    }

    /// Transitions this node to an (empty) directory
    ///
    /// A node that is already a directory keeps its children. A file loses
    /// its size (directories report 0) but keeps its hash marker.
    pub fn make_directory(&mut self) {
        if let Entry::File { hash, .. } = &mut self.entry {
            self.entry = Entry::Directory {
                children: BTreeMap::new(),
                hash: hash.take(),
            };
        }
    }

    /// Transitions this node to a file, discarding any children
    pub fn make_file(&mut self, size: u64) {
        match &mut self.entry {
            Entry::Directory { hash, .. } => {
                self.entry = Entry::File {
                    size,
                    hash: hash.take(),
                };
            }
            Entry::File { size: s, .. } => *s = size,
        }
    }

    /// Updates the size of a file node; no-op for directories
    pub fn set_size(&mut self, new_size: u64) {
        if let Entry::File { size, .. } = &mut self.entry {
            *size = new_size;
        }
    }
}

// ============================================================================
// FileGraph
// ============================================================================

/// Arena of nodes forming one provider's virtual tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileGraph {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
}

impl FileGraph {
    /// Creates a graph containing a single root directory
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::new_directory(root_name));
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    /// Id of the root directory
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena (root included)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Looks up a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutable lookup by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Looks up a node, failing with `NotFound` when the id is stale
    pub fn node(&self, id: NodeId) -> Result<&Node, StorageError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(format!("node {id} is not in the tree")))
    }

    /// Mutable counterpart of [`node`](Self::node)
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, StorageError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("node {id} is not in the tree")))
    }

    /// Looks up a node and verifies it is a directory
    pub fn directory(&self, id: NodeId) -> Result<&Node, StorageError> {
        let node = self.node(id)?;
        if !node.is_directory() {
            return Err(StorageError::NotADirectory(node.name.clone()));
        }
        Ok(node)
    }

    /// Child lookup by exact provider key
    pub fn child_by_key(&self, dir: NodeId, key: &str) -> Option<NodeId> {
        self.get(dir)?.children()?.get(key).copied()
    }

    /// Child lookup by display name, case-insensitive
    ///
    /// Probes the key map with the lower-cased name first (hits for
    /// name-keyed backends), then falls back to a linear scan over display
    /// names (required for id-keyed backends).
    pub fn child_by_name(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let children = self.get(dir)?.children()?;
        if let Some(id) = children.get(&name_key(name)) {
            return Some(*id);
        }
        let wanted = name.trim().to_lowercase();
        children
            .values()
            .copied()
            .find(|id| match self.nodes.get(id) {
                Some(node) => node.name.to_lowercase() == wanted,
                None => false,
            })
    }

    /// Key under which `id` is registered in its parent's child map
    pub fn key_of(&self, id: NodeId) -> Option<String> {
        let parent = self.get(id)?.parent?;
        let children = self.get(parent)?.children()?;
        children
            .iter()
            .find(|(_, child)| **child == id)
            .map(|(key, _)| key.clone())
    }

    /// Display path of a node from the root, `/` for the root itself
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                break;
            }
            match self.nodes.get(&current) {
                Some(node) => {
                    parts.push(node.name.clone());
                    cursor = node.parent;
                }
                None => break,
            }
        }
        if parts.is_empty() {
            return "/".to_string();
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Inserts an unattached node as a child of `parent` under `key`
    ///
    /// Fails with `Conflict` when the key is already occupied and with
    /// `NotADirectory` when the parent is a file.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        key: impl Into<String>,
        mut node: Node,
    ) -> Result<NodeId, StorageError> {
        let key = key.into();
        self.directory(parent)?;
        node.parent = Some(parent);
        let id = self.alloc_id();
        match self.node_mut(parent)?.entry {
            Entry::Directory { ref mut children, .. } => {
                if children.contains_key(&key) {
                    return Err(StorageError::Conflict(format!(
                        "an entry with key {key:?} is already present"
                    )));
                }
                children.insert(key, id);
            }
            Entry::File { .. } => return Err(StorageError::NotADirectory(key)),
        }
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Unlinks `id` from its parent without dropping the subtree
    pub fn detach(&mut self, id: NodeId) -> Result<(), StorageError> {
        let parent = match self.node(id)?.parent {
            Some(parent) => parent,
            None => {
                return Err(StorageError::InvalidArgument(
                    "the root cannot be detached".to_string(),
                ))
            }
        };
        let key = self.key_of(id);
        if let Some(key) = key {
            if let Some(Entry::Directory { children, .. }) =
                self.nodes.get_mut(&parent).map(|n| &mut n.entry)
            {
                children.remove(&key);
            }
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Links a detached node under `parent` with the given key
    pub fn attach(
        &mut self,
        id: NodeId,
        parent: NodeId,
        key: impl Into<String>,
    ) -> Result<(), StorageError> {
        let key = key.into();
        self.node(id)?;
        self.directory(parent)?;
        match self.node_mut(parent)?.entry {
            Entry::Directory { ref mut children, .. } => {
                if children.contains_key(&key) {
                    return Err(StorageError::Conflict(format!(
                        "an entry with key {key:?} is already present"
                    )));
                }
                children.insert(key, id);
            }
            Entry::File { .. } => return Err(StorageError::NotADirectory(key)),
        }
        self.node_mut(id)?.parent = Some(parent);
        Ok(())
    }

    /// Ids of a subtree, root first (pre-order)
    fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                order.push(current);
                if let Some(children) = node.children() {
                    stack.extend(children.values().copied());
                }
            }
        }
        order
    }

    /// Removes a node and all its descendants from the tree and the arena
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<(), StorageError> {
        self.detach(id)?;
        for stale in self.subtree_ids(id) {
            self.nodes.remove(&stale);
        }
        Ok(())
    }

    /// Drops every child of `dir`, keeping the directory node itself
    ///
    /// Used when a backend reports that cached state is unreconcilable and
    /// must be rebuilt, and by lazy backends replacing a stale listing.
    pub fn clear_children(&mut self, dir: NodeId) -> Result<(), StorageError> {
        let child_ids: Vec<NodeId> = self
            .directory(dir)?
            .children()
            .map(|c| c.values().copied().collect())
            .unwrap_or_default();
        for child in child_ids {
            for stale in self.subtree_ids(child) {
                self.nodes.remove(&stale);
            }
        }
        if let Some(Entry::Directory { children, .. }) =
            self.nodes.get_mut(&dir).map(|n| &mut n.entry)
        {
            children.clear();
        }
        Ok(())
    }

    /// Deep-copies the subtree at `src` under `dest_parent` with fresh ids
    ///
    /// The copy shares no node or child map with the original; every id in
    /// the copy is newly allocated. Returns the id of the copied subtree
    /// root.
    pub fn clone_subtree(
        &mut self,
        src: NodeId,
        dest_parent: NodeId,
        key: impl Into<String>,
    ) -> Result<NodeId, StorageError> {
        let key = key.into();
        self.node(src)?;
        self.directory(dest_parent)?;

        let order = self.subtree_ids(src);
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
        for &old in &order {
            let fresh = self.alloc_id();
            mapping.insert(old, fresh);
        }

        for &old in &order {
            let mut copy = match self.nodes.get(&old) {
                Some(node) => node.clone(),
                None => continue,
            };
            copy.parent = copy.parent.and_then(|p| mapping.get(&p).copied());
            if let Entry::Directory { children, .. } = &mut copy.entry {
                *children = children
                    .iter()
                    .filter_map(|(k, v)| mapping.get(v).map(|fresh| (k.clone(), *fresh)))
                    .collect();
            }
            if let Some(&fresh) = mapping.get(&old) {
                self.nodes.insert(fresh, copy);
            }
        }

        let new_root = mapping
            .get(&src)
            .copied()
            .ok_or_else(|| StorageError::NotFound(format!("node {src} is not in the tree")))?;
        self.attach(new_root, dest_parent, key)?;
        Ok(new_root)
    }
}

// ============================================================================
// SharedGraph
// ============================================================================

/// A file graph shared between a provider and its callers
///
/// Callers read the tree through this handle; only the owning provider (and
/// the transfer orchestrator acting through the provider contract) mutates
/// it. Lock scopes must stay short and never span an await point.
#[derive(Debug, Clone)]
pub struct SharedGraph(Arc<RwLock<FileGraph>>);

impl SharedGraph {
    /// Wraps a graph for shared access
    pub fn new(graph: FileGraph) -> Self {
        Self(Arc::new(RwLock::new(graph)))
    }

    /// Acquires a read guard; a poisoned lock is recovered, not propagated
    pub fn read(&self) -> RwLockReadGuard<'_, FileGraph> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquires a write guard; a poisoned lock is recovered, not propagated
    pub fn write(&self) -> RwLockWriteGuard<'_, FileGraph> {
        self.0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================

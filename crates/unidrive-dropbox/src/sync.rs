//! Reconciliation of delta-feed entries into the file graph
//!
//! Each entry is a `(path, metadata)` pair: present metadata upserts the
//! path, absent metadata removes it. Paths in the feed arrive lower-cased,
//! which matches the graph's name-keyed child maps; display names come
//! from the metadata's own (display-cased) path.
//!
//! A missing intermediate segment is created as a provisional directory.
//! The server guarantees every extant path eventually appears with correct
//! metadata, so a wrong assumption is corrected by a later entry - this is
//! an eventual-consistency assumption, not a hard guarantee.

use tracing::trace;

use unidrive_core::graph::{name_key, FileGraph, Node, NodeId};

use crate::api::EntryMetadata;

/// Applies delta entries in order
///
/// A page's entries are self-contained and re-applying the same entries
/// is idempotent. Reset and cursor handling live with the provider.
pub(crate) fn apply_entries(
    graph: &mut FileGraph,
    display_name: &str,
    entries: &[(String, Option<EntryMetadata>)],
) {
    for (path, metadata) in entries {
        match metadata {
            Some(metadata) => upsert_path(graph, display_name, path, metadata),
            None => remove_path(graph, path),
        }
    }
}

/// Walks `path`, creating provisional directories for missing levels, and
/// applies the metadata to the leaf
fn upsert_path(graph: &mut FileGraph, display_name: &str, path: &str, metadata: &EntryMetadata) {
    trace!(path, is_dir = metadata.is_dir, "applying delta entry");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut current = graph.root();
    for segment in &segments {
        let key = name_key(segment);
        current = match graph.child_by_key(current, &key) {
            Some(existing) => existing,
            None => {
                // A missing level is assumed to be a directory; if it is
                // actually a file, its own entry arrives later and corrects
                // this node in place.
                match graph.insert_child(current, key, Node::new_directory(*segment)) {
                    Ok(created) => created,
                    Err(_) => return,
                }
            }
        };
    }
    apply_metadata(graph, current, display_name, metadata);
}

/// Applies server-confirmed metadata to an existing node
///
/// Used both by the delta feed and by mutation responses (create, move,
/// copy, upload, navigated-to refresh).
pub(crate) fn apply_metadata(
    graph: &mut FileGraph,
    id: NodeId,
    display_name: &str,
    metadata: &EntryMetadata,
) {
    let was_directory = graph.get(id).map(|n| n.is_directory()).unwrap_or(false);
    if was_directory && !metadata.is_dir {
        // Directory turning into a file: drop the stale subtree first so
        // the arena holds no orphans.
        let _ = graph.clear_children(id);
    }

    let name = metadata
        .display_name()
        .map(str::to_string)
        .unwrap_or_else(|| display_name.to_string());

    if let Some(node) = graph.get_mut(id) {
        if metadata.is_dir {
            node.make_directory();
        } else {
            node.make_file(metadata.bytes);
        }
        node.set_hash(metadata.marker());
        node.read_only = false;
        node.name = name;
    }
}

/// Removes the entry at `path`; silently returns when any level is missing
fn remove_path(graph: &mut FileGraph, path: &str) {
    trace!(path, "removing delta entry");
    let mut current = graph.root();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match graph.child_by_key(current, &name_key(segment)) {
            Some(next) => current = next,
            None => return,
        }
    }
    if current != graph.root() {
        let _ = graph.remove_subtree(current);
    }
}

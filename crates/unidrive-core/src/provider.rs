//! Storage provider port (driven/secondary port)
//!
//! [`StorageProvider`] is the one contract every backend implements and the
//! only integration surface the rest of the system depends on. Two very
//! different synchronization philosophies sit behind it:
//!
//! - **delta-sync** backends keep a cursor into a server-side change feed
//!   and reconcile pages of changes into the tree;
//! - **lazy-refresh** backends have no change feed and re-list a directory
//!   whenever the caller navigates into it.
//!
//! The contract deliberately does not unify the two internal state shapes;
//! it only fixes the shared semantics:
//!
//! - `load_info` must be called exactly once before any other operation.
//! - Mutating operations call the remote first and touch the local tree
//!   only after the server confirms.
//! - Move/copy/rename check the destination for a name collision *before*
//!   issuing the remote call, using the provider's own key normalization,
//!   and fail fast with `Conflict`.
//! - Upload observes the cancellation token at least once per round trip
//!   and reports monotonically non-decreasing progress 0–100 when a sink
//!   is supplied.

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::graph::{NodeId, SharedGraph};

/// Streaming file content, as produced by downloads and consumed by uploads
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Upload progress sink; called with whole percentages 0–100
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Port trait implemented once per storage backend
///
/// A provider owns the [`SharedGraph`] rooted at its root node. Callers may
/// read the graph freely but mutate it only through this contract. A single
/// provider's operations are not re-entrant; callers must not overlap calls
/// on the same provider instance.
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// User-facing display name of this provider instance
    fn name(&self) -> String;

    /// Storage quota in bytes, as last reported by `load_info`
    fn quota(&self) -> u64;

    /// Stable backend tag used to route snapshot restoration
    fn kind(&self) -> &'static str;

    /// The virtual tree owned by this provider
    fn tree(&self) -> SharedGraph;

    /// Fetches quota and root metadata, then runs an initial full sync
    ///
    /// Must be called exactly once, before any other operation.
    async fn load_info(&self) -> Result<(), StorageError>;

    /// Hook invoked when the caller enters a directory
    ///
    /// The backend decides whether to refresh: a lazy backend replaces the
    /// listing wholesale, a delta backend verifies its change-detection
    /// marker and resynchronizes on mismatch.
    async fn navigated_to(&self, node: NodeId) -> Result<(), StorageError>;

    /// Brings the local tree up to date with the remote change feed
    ///
    /// A no-op for backends without an incremental feed.
    async fn synchronize(&self) -> Result<(), StorageError>;

    /// Creates a folder remotely, then mirrors it into the tree
    async fn create_folder(&self, parent: NodeId, name: &str) -> Result<NodeId, StorageError>;

    /// Uploads `content` as a new file under `parent`
    ///
    /// `size_hint` is the total content length when known; it is required
    /// for progress reporting. Cancellation leaves the tree unmodified and
    /// abandons any partial remote upload session.
    async fn upload_file(
        &self,
        parent: NodeId,
        name: &str,
        content: ContentStream,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
        size_hint: Option<u64>,
    ) -> Result<NodeId, StorageError>;

    /// Opens a download stream for a file node
    async fn download(&self, node: NodeId) -> Result<ContentStream, StorageError>;

    /// Renames a node remotely, then updates the tree
    async fn rename(&self, node: NodeId, new_name: &str) -> Result<(), StorageError>;

    /// Moves a node into `dest_parent` within this provider
    async fn move_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError>;

    /// Copies a node into `dest_parent` within this provider
    async fn copy_item(&self, node: NodeId, dest_parent: NodeId) -> Result<NodeId, StorageError>;

    /// Deletes a node remotely, then removes it from the tree
    async fn delete_item(&self, node: NodeId) -> Result<(), StorageError>;

    /// Serializes this provider's persistent state (tree, cursor, quota)
    fn export_state(&self) -> Result<serde_json::Value, StorageError>;
}

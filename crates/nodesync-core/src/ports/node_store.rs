//! Node store port (driven/secondary port)
//!
//! Persistent, key-indexed cache of content nodes.
//!
//! ## Design Notes
//!
//! - Methods are infallible from the caller's point of view. Adapters log
//!   storage failures and degrade to "not found" or a no-op, so callers must
//!   treat an absent result as "re-fetch from remote".
//! - Every list query is ordered by title.

use std::collections::HashMap;

use crate::domain::{ListNode, SyncStatus};

/// Number of cached nodes per sync status
pub type StatusCounts = HashMap<SyncStatus, u64>;

// ============================================================================
// T040: INodeStore trait
// ============================================================================

#[async_trait::async_trait]
pub trait INodeStore: Send + Sync {
    /// Upserts a node
    ///
    /// A node without `local_id` is looked up by `guid`; when a record exists
    /// the snapshot is merged into it with [`ListNode::update_with`], which
    /// keeps local-only fields such as `marked_as_offline`. Otherwise the
    /// node is inserted.
    ///
    /// # Returns
    /// The persisted record, or `None` if storage failed
    async fn store(&self, node: &ListNode) -> Option<ListNode>;

    /// Looks up the persisted record for a node, by `local_id` first, then `guid`
    async fn query(&self, node: &ListNode) -> Option<ListNode>;

    /// Returns the cached children of a folder
    async fn query_children(&self, parent_guid: &str) -> Vec<ListNode>;

    /// Returns every node the user pinned for offline use
    async fn query_marked_offline(&self) -> Vec<ListNode>;

    /// Returns every node marked for removal
    async fn query_marked_for_deletion(&self) -> Vec<ListNode>;

    /// Returns every node marked for download
    async fn query_marked_for_download(&self) -> Vec<ListNode>;

    /// Removes a node, its cached content, and its unpinned descendants
    ///
    /// Descendants are removed depth-first. Offline-pinned descendants are
    /// left in place.
    async fn remove(&self, node: &ListNode);

    /// Counts cached nodes grouped by sync status
    async fn count_by_status(&self) -> StatusCounts;
}

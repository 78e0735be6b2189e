//! Transfer store port (driven/secondary port)
//!
//! Persistent queue of pending uploads. General content uploads and task
//! attachments share one schema and are told apart by
//! `UploadTransfer::is_task_attachment`.
//!
//! ## Design Notes
//!
//! - `store` upserts on `local_filename_path`.
//! - `subscribe` re-invokes its handler whenever the filtered result set
//!   changes, so listings reflect newly queued uploads without polling.
//! - `SubscriptionHandle` is an RAII guard: dropping it ends the subscription.

use crate::domain::UploadTransfer;

/// Callback receiving the current transfers of a subscribed parent
pub type TransferChangeHandler = Box<dyn Fn(Vec<UploadTransfer>) + Send + Sync>;

// ============================================================================
// T045: SubscriptionHandle struct
// ============================================================================

/// RAII handle for a live transfer query
///
/// ## Usage
///
/// ```ignore
/// let handle = transfers.subscribe("folder-guid", Box::new(|list| refresh(list))).await;
/// // ... handler runs on every change ...
/// drop(handle); // subscription ends
/// ```
pub struct SubscriptionHandle {
    cancel_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Creates a handle that invokes `cancel_fn` exactly once when dropped
    pub fn new(cancel_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel_fn: Some(Box::new(cancel_fn)),
        }
    }

    /// Explicitly ends the subscription, consuming the handle
    pub fn cancel(mut self) {
        if let Some(cancel_fn) = self.cancel_fn.take() {
            cancel_fn();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(cancel_fn) = self.cancel_fn.take() {
            cancel_fn();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.cancel_fn.is_some())
            .finish()
    }
}

// ============================================================================
// T046: ITransferStore trait
// ============================================================================

#[async_trait::async_trait]
pub trait ITransferStore: Send + Sync {
    /// Upserts a transfer keyed on `local_filename_path`
    ///
    /// # Returns
    /// The persisted record, or `None` if storage failed
    async fn store(&self, transfer: &UploadTransfer) -> Option<UploadTransfer>;

    /// Deletes a transfer record
    async fn remove(&self, transfer: &UploadTransfer);

    /// Returns transfers still awaiting upload (not synced, not in progress)
    ///
    /// # Arguments
    /// * `is_task_attachment` - Selects task attachments or general uploads
    async fn query_all(&self, is_task_attachment: bool) -> Vec<UploadTransfer>;

    /// Returns every transfer queued into a parent, whatever its status
    async fn query_for_parent(&self, parent_node_id: &str) -> Vec<UploadTransfer>;

    /// Moves transfers left in progress by an interrupted pass back to pending
    ///
    /// # Returns
    /// Number of transfers requeued
    async fn requeue_interrupted(&self) -> u64;

    /// Subscribes to the transfers of a parent
    ///
    /// The handler is invoked once with the current list, then again every
    /// time that list changes, until the returned handle is dropped.
    async fn subscribe(
        &self,
        parent_node_id: &str,
        handler: TransferChangeHandler,
    ) -> SubscriptionHandle;
}

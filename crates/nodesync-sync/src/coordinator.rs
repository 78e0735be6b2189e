//! Sync pass coordinator
//!
//! Composes factory operations into a full pass over one shared
//! [`OperationQueue`]. Phases run one after another; within a phase the
//! operations run concurrently up to the queue width.
//!
//! ```text
//! deletion sweep ─► requeue interrupted ─► offline roots ─► children diff
//!                                                              │
//!                         uploads ◄─ downloads (+ renditions) ◄┘
//! ```
//!
//! Deletion comes first so nodes marked for removal by one pass are only
//! removed by the next, never inline with the diff that marked them.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::SyncEventPublisher;
use crate::factory::{PassCounts, SyncContext, SyncOperationFactory};
use crate::queue::{OperationQueue, SyncOperation};
use crate::SyncError;

// ============================================================================
// T100: SyncTrigger
// ============================================================================

/// What started a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    PullToRefresh,
    Background,
    SyncNow,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::PullToRefresh => "pull_to_refresh",
            SyncTrigger::Background => "background",
            SyncTrigger::SyncNow => "sync_now",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// T101: SyncPassReport
// ============================================================================

/// Summary of a finished (or cancelled) pass
#[derive(Debug, Clone)]
pub struct SyncPassReport {
    pub pass_id: Uuid,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub counts: PassCounts,
    /// Transfers recovered from a previously interrupted pass
    pub requeued: u64,
    pub cancelled: bool,
}

/// Clears the running pass's token when the pass ends, however it ends
struct PassGuard<'a>(&'a SyncCoordinator);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock_current() = None;
    }
}

// ============================================================================
// T102: SyncCoordinator
// ============================================================================

/// Runs sync passes, one at a time
pub struct SyncCoordinator {
    context: Arc<SyncContext>,
    queue: OperationQueue,
    /// Token of the running pass; `Some` exactly while a pass runs
    current: Mutex<Option<CancellationToken>>,
}

impl SyncCoordinator {
    /// Creates a coordinator with its own operation queue
    ///
    /// # Arguments
    /// * `context` - Stores, gateway and paths used by every pass
    /// * `max_concurrent_operations` - Width of the operation queue
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime (the queue spawns workers).
    pub fn new(context: SyncContext, max_concurrent_operations: usize) -> Self {
        Self {
            context: Arc::new(context),
            queue: OperationQueue::new(max_concurrent_operations),
            current: Mutex::new(None),
        }
    }

    pub fn publisher(&self) -> &SyncEventPublisher {
        &self.context.publisher
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.lock_current().is_some()
    }

    /// Cancels the running pass, if any
    ///
    /// No further recursive operations are enqueued and running operations
    /// stop at their next resume point. Nodes keep the state they had.
    pub fn cancel(&self) {
        let current = self.lock_current();
        if let Some(token) = current.as_ref() {
            info!("Cancelling sync pass");
            token.cancel();
            self.queue.cancel_all();
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new pass, or `None` if one is already running
    ///
    /// The token is published under the same lock `cancel` takes, so a
    /// cancel can never slip in between a pass starting and its token
    /// becoming visible.
    fn begin_pass(&self) -> Option<CancellationToken> {
        let mut current = self.lock_current();
        if current.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Some(token)
    }

    /// Runs one full sync pass
    ///
    /// # Returns
    /// A report of what the pass did. Individual node failures are recorded
    /// in the stores and counted here; they never fail the pass.
    ///
    /// # Errors
    /// Returns [`SyncError::PassInProgress`] if another pass is running
    #[tracing::instrument(skip(self), fields(pass_id = tracing::field::Empty))]
    pub async fn run_pass(&self, trigger: SyncTrigger) -> Result<SyncPassReport, SyncError> {
        let cancel = self.begin_pass().ok_or(SyncError::PassInProgress)?;
        let _guard = PassGuard(self);

        let pass_id = Uuid::new_v4();
        tracing::Span::current().record("pass_id", tracing::field::display(pass_id));
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%trigger, "Starting sync pass");

        let factory = SyncOperationFactory::new(self.context.clone(), cancel.clone());
        let ctx = &self.context;

        // Phase 1: nodes marked for removal by an earlier pass
        let marked = ctx.node_store.query_marked_for_deletion().await;
        self.run_phase("deletion", factory.delete_marked_nodes_operations(&marked))
            .await;

        // Phase 2: transfers a crashed pass left in progress
        let requeued = ctx.transfer_store.requeue_interrupted().await;
        if requeued > 0 {
            info!(requeued, "Requeued interrupted transfers");
        }

        // Phase 3: offline roots
        if !cancel.is_cancelled() {
            let (folders, files): (Vec<_>, Vec<_>) = ctx
                .node_store
                .query_marked_offline()
                .await
                .into_iter()
                .partition(|n| n.is_container());
            debug!(folders = folders.len(), files = files.len(), "Refreshing offline roots");
            for folder in &folders {
                factory.schedule_folder_node_details_operations(folder, &self.queue);
            }
            self.run_phase("offline roots", factory.file_node_details_operations(&files))
                .await;
        }

        // Phase 4: children that vanished remotely
        if !cancel.is_cancelled() {
            self.run_phase("children diff", vec![factory.children_removal_operation()])
                .await;
        }

        // Phase 5: downloads
        if !cancel.is_cancelled() {
            let pending = ctx.node_store.query_marked_for_download().await;
            self.run_phase("downloads", factory.download_marked_nodes_operations(&pending))
                .await;
        }

        // Phase 6: uploads
        if !cancel.is_cancelled() {
            let mut transfers = ctx.transfer_store.query_all(false).await;
            transfers.extend(ctx.transfer_store.query_all(true).await);
            self.run_phase("uploads", factory.upload_pending_content_operations(&transfers))
                .await;
        }

        let report = SyncPassReport {
            pass_id,
            trigger,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            counts: factory.counts(),
            requeued,
            cancelled: cancel.is_cancelled(),
        };
        info!(
            synced = report.counts.synced,
            downloaded = report.counts.downloaded,
            uploaded = report.counts.uploaded,
            marked_for_removal = report.counts.marked_for_removal,
            removed = report.counts.removed,
            failed = report.counts.failed,
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Sync pass finished"
        );
        Ok(report)
    }

    /// Submits a phase's operations and waits until the queue drains
    ///
    /// Operations already submitted by the caller (folder descents) are
    /// awaited together with these.
    async fn run_phase(&self, phase: &str, operations: Vec<SyncOperation>) {
        debug!(phase, operations = operations.len(), "Running phase");
        for operation in operations {
            self.queue.submit(operation);
        }
        self.queue.wait_idle().await;
    }
}

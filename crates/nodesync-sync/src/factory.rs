//! Sync operation factory
//!
//! Builds the operations that make up a sync pass. Every operation captures
//! a clone of the factory, which carries the shared [`SyncContext`], the
//! pass-wide cancellation token, and the per-pass bookkeeping (observed
//! folder listings and counters).
//!
//! ## Node transitions
//!
//! ```text
//!  pending ──► inProgress/download ──► synced/undefined   (download ok)
//!     │                 │
//!     │                 └────────────► error              (download failed)
//!     └──────────────────────────────► synced/undefined   (cache current)
//!
//!  any ──► undefined/removal   (404/403, or absent from a complete listing)
//!  any ──► error               (any other remote failure)
//! ```
//!
//! Cancellation never changes node state; operations only clean up partial
//! files and return.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use nodesync_core::domain::{
    needs_rendition, ContentPaths, ListNode, MarkedFor, SyncStatus, UploadTransfer,
};
use nodesync_core::ports::{
    ErrorClass, ILocalContent, INodeStore, IRemoteGateway, ITransferStore, NewNode, RemoteError,
};

use crate::events::{SyncEvent, SyncEventPublisher};
use crate::queue::{OperationHandle, OperationQueue, OperationScope, SyncOperation};

// ============================================================================
// T090: SyncContext
// ============================================================================

/// Everything an operation needs, shared by all operations of all passes
pub struct SyncContext {
    pub node_store: Arc<dyn INodeStore>,
    pub transfer_store: Arc<dyn ITransferStore>,
    pub gateway: Arc<dyn IRemoteGateway>,
    pub local: Arc<dyn ILocalContent>,
    pub publisher: SyncEventPublisher,
    pub paths: ContentPaths,
    /// Account whose content directories are written
    pub account_id: String,
    /// Children requested per listing page
    pub page_size: u32,
}

/// Outcome counters of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounts {
    /// Nodes confirmed up to date without a download
    pub synced: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub marked_for_removal: u64,
    pub removed: u64,
    /// Nodes or transfers left in the error state
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    synced: AtomicU64,
    downloaded: AtomicU64,
    uploaded: AtomicU64,
    marked_for_removal: AtomicU64,
    removed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PassCounts {
        PassCounts {
            synced: self.synced.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            marked_for_removal: self.marked_for_removal.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Remote children seen for one folder during the pass
#[derive(Default)]
struct ObservedListing {
    /// Set once the last page arrived; incomplete listings are never diffed
    complete: bool,
    guids: HashSet<String>,
}

struct FactoryState {
    context: Arc<SyncContext>,
    cancel: CancellationToken,
    listings: DashMap<String, ObservedListing>,
    counters: Counters,
}

// ============================================================================
// T091: SyncOperationFactory
// ============================================================================

/// Builds the operations of one sync pass
///
/// Create one factory per pass: the children-removal diff only considers
/// listings observed through this factory.
#[derive(Clone)]
pub struct SyncOperationFactory {
    state: Arc<FactoryState>,
}

impl SyncOperationFactory {
    /// Creates a factory for a new pass
    ///
    /// # Arguments
    /// * `context` - Stores, gateway and paths shared by the operations
    /// * `cancel` - Pass-wide token; once cancelled no further follow-up
    ///   operations are enqueued and running ones stop at their next check
    pub fn new(context: Arc<SyncContext>, cancel: CancellationToken) -> Self {
        Self {
            state: Arc::new(FactoryState {
                context,
                cancel,
                listings: DashMap::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.state.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    /// Counters accumulated so far
    pub fn counts(&self) -> PassCounts {
        self.state.counters.snapshot()
    }

    fn context(&self) -> &SyncContext {
        &self.state.context
    }

    fn halted(&self, scope: &OperationScope) -> bool {
        self.state.cancel.is_cancelled() || scope.is_cancelled()
    }

    /// Submits a follow-up operation unless the pass was cancelled
    fn enqueue(&self, scope: &OperationScope, operation: SyncOperation) {
        if self.is_cancelled() {
            debug!(label = operation.label(), "Pass cancelled, follow-up not enqueued");
            return;
        }
        scope.submit(operation);
    }

    fn publish(&self, node: ListNode) {
        self.context().publisher.publish(SyncEvent::new(node));
    }

    // ========================================================================
    // T092: Children reconciliation
    // ========================================================================

    /// Starts recursive children reconciliation of `folder` on `queue`
    ///
    /// Each listing page is its own operation; subfolders and follow-up pages
    /// are submitted to the same queue as they are discovered.
    ///
    /// # Returns
    /// The handle of the first page operation, or `None` if the pass is
    /// already cancelled
    pub fn schedule_folder_node_details_operations(
        &self,
        folder: &ListNode,
        queue: &OperationQueue,
    ) -> Option<OperationHandle> {
        if self.is_cancelled() {
            return None;
        }
        Some(queue.submit(self.folder_page_operation(folder.clone(), 0)))
    }

    fn folder_page_operation(&self, folder: ListNode, skip_count: u32) -> SyncOperation {
        let factory = self.clone();
        let label = format!("children:{}@{}", folder.guid, skip_count);
        SyncOperation::new(label, move |scope| async move {
            factory.reconcile_children_page(folder, skip_count, scope).await;
        })
    }

    #[instrument(skip(self, folder, scope), fields(folder = %folder.guid))]
    async fn reconcile_children_page(&self, folder: ListNode, skip_count: u32, scope: OperationScope) {
        if self.halted(&scope) {
            return;
        }

        if skip_count == 0 {
            match self.state.listings.entry(folder.guid.clone()) {
                Entry::Occupied(_) => {
                    debug!("Folder already reconciled in this pass");
                    return;
                }
                Entry::Vacant(slot) => {
                    slot.insert(ObservedListing::default());
                }
            }
        }

        let ctx = self.context();
        let result = ctx
            .gateway
            .list_children(&folder.guid, skip_count, ctx.page_size)
            .await;
        if self.halted(&scope) {
            debug!("Cancelled after listing");
            return;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.apply_remote_error(&folder, &e).await;
                return;
            }
        };

        if let Some(mut listing) = self.state.listings.get_mut(&folder.guid) {
            listing
                .guids
                .extend(page.nodes.iter().map(|n| n.guid.clone()));
        }
        if skip_count == 0 {
            self.settle(&folder, SyncStatus::Synced, Some(MarkedFor::Undefined))
                .await;
        }

        let next_skip_count = page.next_skip_count();
        debug!(count = page.nodes.len(), ?next_skip_count, "Reconciling page");

        for remote in page.nodes {
            if remote.is_container() {
                let child = self.persist_folder(remote).await;
                self.enqueue(&scope, self.folder_page_operation(child, 0));
            } else {
                self.reconcile_file(remote).await;
            }
        }

        match next_skip_count {
            Some(next) => self.enqueue(&scope, self.folder_page_operation(folder, next)),
            None => {
                if let Some(mut listing) = self.state.listings.get_mut(&folder.guid) {
                    listing.complete = true;
                }
                debug!("Listing complete");
            }
        }
    }

    /// Persists a remotely listed folder as synced, keeping its offline pin
    async fn persist_folder(&self, remote: ListNode) -> ListNode {
        let ctx = self.context();
        let cached = ctx.node_store.query(&remote).await;

        let mut node = remote;
        node.strip_unknown_operations();
        node.marked_as_offline = cached.as_ref().is_some_and(|c| c.marked_as_offline);
        node.sync_status = SyncStatus::Synced;
        node.marked_for = MarkedFor::Undefined;

        let changed = state_changed(cached.as_ref(), &node);
        let stored = ctx.node_store.store(&node).await;
        let stored = stored.unwrap_or(node);
        Counters::bump(&self.state.counters.synced);
        if changed {
            self.publish(stored.clone());
        }
        stored
    }

    /// Diffs a remote file against its cached record and persists the outcome
    ///
    /// The file needs a download when it is new, its `modified_at` moved, an
    /// earlier download never finished, or its content is missing on disk.
    async fn reconcile_file(&self, remote: ListNode) {
        let ctx = self.context();
        let cached = ctx.node_store.query(&remote).await;

        if let Some(previous) = cached.as_ref().filter(|c| c.title != remote.title) {
            // Content paths derive from the title; drop the copies under the old name
            self.discard_content(previous).await;
        }

        let content_path = ctx
            .paths
            .file_local_path(&ctx.account_id, &remote.guid, &remote.title);
        let content_present = ctx.local.exists(&content_path).await;
        let stale = !content_present
            || match &cached {
                None => true,
                Some(c) => c.modified_at != remote.modified_at || c.marked_for == MarkedFor::Download,
            };

        let mut node = remote;
        node.strip_unknown_operations();
        node.marked_as_offline = cached.as_ref().is_some_and(|c| c.marked_as_offline);
        if stale {
            node.sync_status = SyncStatus::InProgress;
            node.marked_for = MarkedFor::Download;
        } else {
            node.sync_status = SyncStatus::Synced;
            node.marked_for = MarkedFor::Undefined;
            Counters::bump(&self.state.counters.synced);
        }

        debug!(guid = %node.guid, stale, content_present, "Reconciled file");
        let changed = state_changed(cached.as_ref(), &node);
        let stored = ctx.node_store.store(&node).await;
        let stored = stored.unwrap_or(node);
        if changed {
            self.publish(stored);
        }
    }

    // ========================================================================
    // T093: File detail refresh
    // ========================================================================

    /// One metadata refresh operation per node
    ///
    /// Local-only nodes are skipped; they have nothing to fetch.
    pub fn file_node_details_operations(&self, nodes: &[ListNode]) -> Vec<SyncOperation> {
        nodes
            .iter()
            .filter(|n| !n.is_local_only())
            .map(|n| {
                let factory = self.clone();
                let node = n.clone();
                SyncOperation::new(format!("detail:{}", node.guid), move |scope| async move {
                    factory.refresh_node(node, scope).await;
                })
            })
            .collect()
    }

    #[instrument(skip(self, node, scope), fields(guid = %node.guid))]
    async fn refresh_node(&self, node: ListNode, scope: OperationScope) {
        if self.halted(&scope) {
            return;
        }

        let result = self.context().gateway.node_detail(&node.guid).await;
        if self.halted(&scope) {
            return;
        }

        match result {
            Ok(mut remote) => {
                if remote.parent_guid.is_empty() {
                    remote.parent_guid = node.parent_guid.clone();
                }
                if remote.is_container() {
                    let folder = self.persist_folder(remote).await;
                    self.enqueue(&scope, self.folder_page_operation(folder, 0));
                } else {
                    self.reconcile_file(remote).await;
                }
            }
            Err(e) => self.apply_remote_error(&node, &e).await,
        }
    }

    // ========================================================================
    // T094: Children removal diff
    // ========================================================================

    /// Marks cached children missing from their folder's remote listing
    ///
    /// Runs once every listing of the pass has finished. Only folders whose
    /// listing completed are diffed, and offline-pinned children are never
    /// marked; they are refreshed as roots of their own instead.
    pub fn children_removal_operation(&self) -> SyncOperation {
        let factory = self.clone();
        SyncOperation::new("children-removal", move |scope| async move {
            factory.mark_missing_children(scope).await;
        })
    }

    async fn mark_missing_children(&self, scope: OperationScope) {
        let listings: Vec<(String, HashSet<String>)> = self
            .state
            .listings
            .iter()
            .filter(|entry| entry.complete)
            .map(|entry| (entry.key().clone(), entry.guids.clone()))
            .collect();

        for (parent, seen) in listings {
            if self.halted(&scope) {
                return;
            }
            for child in self.context().node_store.query_children(&parent).await {
                if seen.contains(&child.guid)
                    || child.is_local_only()
                    || child.marked_for == MarkedFor::Removal
                {
                    continue;
                }
                if child.marked_as_offline {
                    debug!(guid = %child.guid, %parent, "Pinned child missing from listing, left to its own refresh");
                    continue;
                }
                info!(guid = %child.guid, %parent, "Child no longer listed remotely, marking for removal");
                self.settle(&child, SyncStatus::Undefined, Some(MarkedFor::Removal))
                    .await;
                Counters::bump(&self.state.counters.marked_for_removal);
            }
        }
    }

    // ========================================================================
    // T095: Content and rendition download
    // ========================================================================

    /// One download operation per file node
    ///
    /// Successful downloads of types without a native preview enqueue a
    /// rendition download as a follow-up.
    pub fn download_marked_nodes_operations(&self, nodes: &[ListNode]) -> Vec<SyncOperation> {
        nodes
            .iter()
            .filter(|n| !n.is_container() && !n.is_local_only())
            .map(|n| {
                let factory = self.clone();
                let node = n.clone();
                SyncOperation::new(format!("download:{}", node.guid), move |scope| async move {
                    factory.download_content(node, scope).await;
                })
            })
            .collect()
    }

    #[instrument(skip(self, node, scope), fields(guid = %node.guid))]
    async fn download_content(&self, node: ListNode, scope: OperationScope) {
        if self.halted(&scope) {
            return;
        }

        let ctx = self.context();
        let destination = ctx
            .paths
            .file_local_path(&ctx.account_id, &node.guid, &node.title);
        if !self.prepare_destination(&destination).await {
            self.fail_node(&node).await;
            return;
        }

        let result = ctx
            .gateway
            .download_content(&node.guid, &destination, scope.cancel_token())
            .await;
        if self.halted(&scope) {
            self.discard_partial(&destination).await;
            debug!("Download cancelled");
            return;
        }

        match result {
            Ok(Some(_)) => {
                info!(path = %destination.display(), "Downloaded content");
                self.settle(&node, SyncStatus::Synced, Some(MarkedFor::Undefined))
                    .await;
                Counters::bump(&self.state.counters.downloaded);
                if node.mime_type.as_deref().is_some_and(needs_rendition) {
                    self.enqueue(&scope, self.rendition_operation(node));
                }
            }
            Ok(None) => {
                self.discard_partial(&destination).await;
                debug!("Download cancelled by transport");
            }
            Err(e) if is_cancellation(&e) => {
                self.discard_partial(&destination).await;
                debug!("Download cancelled by transport");
            }
            Err(e) => {
                self.discard_partial(&destination).await;
                warn!(error = %e, "Download failed");
                self.fail_node(&node).await;
            }
        }
    }

    fn rendition_operation(&self, node: ListNode) -> SyncOperation {
        let factory = self.clone();
        SyncOperation::new(format!("rendition:{}", node.guid), move |scope| async move {
            factory.download_rendition(node, scope).await;
        })
    }

    #[instrument(skip(self, node, scope), fields(guid = %node.guid))]
    async fn download_rendition(&self, node: ListNode, scope: OperationScope) {
        if self.halted(&scope) {
            return;
        }

        let ctx = self.context();
        let result = ctx.gateway.rendition_url(&node.guid).await;
        if self.halted(&scope) {
            return;
        }

        let url = match result {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!("No rendition available");
                return;
            }
            Err(e) if is_cancellation(&e) => return,
            Err(e) => {
                warn!(error = %e, "Rendition lookup failed");
                self.fail_rendition(&node).await;
                return;
            }
        };

        let destination = ctx
            .paths
            .rendition_local_path(&ctx.account_id, &node.guid, &node.title);
        if !self.prepare_destination(&destination).await {
            self.fail_rendition(&node).await;
            return;
        }

        let result = ctx
            .gateway
            .download_url(&url, &destination, scope.cancel_token())
            .await;
        if self.halted(&scope) {
            self.discard_partial(&destination).await;
            return;
        }

        match result {
            Ok(Some(_)) => debug!(path = %destination.display(), "Downloaded rendition"),
            Ok(None) => self.discard_partial(&destination).await,
            Err(e) if is_cancellation(&e) => self.discard_partial(&destination).await,
            Err(e) => {
                self.discard_partial(&destination).await;
                warn!(error = %e, "Rendition download failed");
                self.fail_rendition(&node).await;
            }
        }
    }

    /// Creates the destination's parent directory
    async fn prepare_destination(&self, destination: &Path) -> bool {
        let Some(parent) = destination.parent() else {
            return true;
        };
        match self.context().local.create_directory(parent).await {
            Ok(()) => true,
            Err(e) => {
                error!(path = %parent.display(), error = %e, "Could not create download directory");
                false
            }
        }
    }

    // ========================================================================
    // T096: Upload of pending transfers
    // ========================================================================

    /// One upload operation per transfer
    pub fn upload_pending_content_operations(&self, transfers: &[UploadTransfer]) -> Vec<SyncOperation> {
        transfers
            .iter()
            .map(|t| {
                let factory = self.clone();
                let transfer = t.clone();
                SyncOperation::new(
                    format!("upload:{}", transfer.local_filename_path),
                    move |scope| async move {
                        factory.upload_transfer(transfer, scope).await;
                    },
                )
            })
            .collect()
    }

    #[instrument(skip(self, transfer, scope), fields(path = %transfer.local_filename_path))]
    async fn upload_transfer(&self, mut transfer: UploadTransfer, scope: OperationScope) {
        if self.halted(&scope) {
            return;
        }

        let ctx = self.context();
        let previous_status = transfer.sync_status;
        transfer.sync_status = SyncStatus::InProgress;
        ctx.transfer_store.store(&transfer).await;

        let source = match ctx
            .paths
            .upload_local_path(&ctx.account_id, &transfer.local_filename_path)
        {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Transfer has an invalid local path");
                self.fail_transfer(transfer).await;
                return;
            }
        };
        let content = match ctx.local.read_bytes(&source).await {
            Ok(content) => content,
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Could not read upload source");
                self.fail_transfer(transfer).await;
                return;
            }
        };
        if self.halted(&scope) {
            self.restore_transfer(transfer, previous_status).await;
            return;
        }

        let request = NewNode {
            parent_guid: transfer.parent_node_id.clone(),
            name: transfer.file_name(),
            description: transfer.node_description.clone(),
            mimetype: transfer.mimetype.clone(),
            content,
            auto_rename: true,
        };

        match ctx.gateway.create_node(request).await {
            // The remote node exists now, so the transfer is done even if
            // cancellation was requested meanwhile
            Ok(created) => {
                ctx.transfer_store.remove(&transfer).await;
                if let Err(e) = ctx.local.delete_path(&source).await {
                    warn!(source = %source.display(), error = %e, "Could not delete uploaded source");
                }
                info!(guid = %created.guid, name = %created.title, "Uploaded transfer");
                Counters::bump(&self.state.counters.uploaded);

                let mut node = created;
                node.sync_status = SyncStatus::Synced;
                node.marked_for = MarkedFor::Undefined;
                self.publish(node);
            }
            Err(e) if is_cancellation(&e) => {
                self.restore_transfer(transfer, previous_status).await;
            }
            Err(e) => {
                warn!(error = %e, "Upload failed");
                self.fail_transfer(transfer).await;
            }
        }
    }

    async fn fail_transfer(&self, mut transfer: UploadTransfer) {
        transfer.sync_status = SyncStatus::Error;
        self.context().transfer_store.store(&transfer).await;
        Counters::bump(&self.state.counters.failed);
        self.publish(transfer.list_node());
    }

    async fn restore_transfer(&self, mut transfer: UploadTransfer, status: SyncStatus) {
        debug!("Upload cancelled");
        transfer.sync_status = status;
        self.context().transfer_store.store(&transfer).await;
    }

    // ========================================================================
    // T097: Deletion sweep
    // ========================================================================

    /// One removal operation per node marked for removal
    ///
    /// No remote call is made: the node is already known to be gone.
    pub fn delete_marked_nodes_operations(&self, nodes: &[ListNode]) -> Vec<SyncOperation> {
        nodes
            .iter()
            .map(|n| {
                let factory = self.clone();
                let node = n.clone();
                SyncOperation::new(format!("delete:{}", node.guid), move |scope| async move {
                    if factory.halted(&scope) {
                        return;
                    }
                    factory.context().node_store.remove(&node).await;
                    info!(guid = %node.guid, title = %node.title, "Removed node");
                    Counters::bump(&factory.state.counters.removed);
                    factory.publish(node);
                })
            })
            .collect()
    }

    // ========================================================================
    // Shared state transitions
    // ========================================================================

    /// Translates a remote failure into node state
    async fn apply_remote_error(&self, node: &ListNode, error: &RemoteError) {
        match error.classify() {
            ErrorClass::AuthoritativeAbsence => {
                info!(guid = %node.guid, status = ?error.status(), "Remote reports node absent, marking for removal");
                self.settle(node, SyncStatus::Undefined, Some(MarkedFor::Removal))
                    .await;
                Counters::bump(&self.state.counters.marked_for_removal);
            }
            ErrorClass::Transient => {
                warn!(guid = %node.guid, error = %error, "Sync operation failed");
                self.fail_node(node).await;
            }
            ErrorClass::Cancelled => {
                debug!(guid = %node.guid, "Remote call cancelled");
            }
        }
    }

    async fn fail_node(&self, node: &ListNode) {
        self.settle(node, SyncStatus::Error, None).await;
        Counters::bump(&self.state.counters.failed);
    }

    /// Fails a node whose content is in place but whose rendition is not
    ///
    /// The download mark makes the next pass treat the file as stale and
    /// fetch both again.
    async fn fail_rendition(&self, node: &ListNode) {
        self.settle(node, SyncStatus::Error, Some(MarkedFor::Download))
            .await;
        Counters::bump(&self.state.counters.failed);
    }

    /// Moves the cached record of `node` to a new state
    ///
    /// `marked_for: None` keeps the current mark. Nothing is written or
    /// published when the state does not change.
    async fn settle(&self, node: &ListNode, status: SyncStatus, marked_for: Option<MarkedFor>) {
        let store = &self.context().node_store;
        let mut current = store.query(node).await.unwrap_or_else(|| node.clone());
        let marked_for = marked_for.unwrap_or(current.marked_for);
        if current.sync_status == status && current.marked_for == marked_for {
            return;
        }

        current.sync_status = status;
        current.marked_for = marked_for;
        let stored = store.store(&current).await;
        let stored = stored.unwrap_or(current);
        self.publish(stored);
    }

    async fn discard_partial(&self, path: &Path) {
        if let Err(e) = self.context().local.delete_path(path).await {
            warn!(path = %path.display(), error = %e, "Could not delete partial download");
        }
    }

    /// Deletes the cached content and rendition of a node
    async fn discard_content(&self, node: &ListNode) {
        let ctx = self.context();
        for path in [
            ctx.paths.file_local_path(&ctx.account_id, &node.guid, &node.title),
            ctx.paths.rendition_local_path(&ctx.account_id, &node.guid, &node.title),
        ] {
            if let Err(e) = ctx.local.delete_path(&path).await {
                warn!(path = %path.display(), error = %e, "Could not delete stale content");
            }
        }
    }
}

fn state_changed(cached: Option<&ListNode>, node: &ListNode) -> bool {
    cached.map_or(true, |c| {
        c.sync_status != node.sync_status || c.marked_for != node.marked_for
    })
}

fn is_cancellation(error: &RemoteError) -> bool {
    matches!(error.classify(), ErrorClass::Cancelled)
}

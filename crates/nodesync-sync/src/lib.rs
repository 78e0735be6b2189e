//! NodeSync Sync - Offline synchronization engine
//!
//! Reconciles the local node cache against the remote repository by building
//! a graph of independently schedulable operations and running them on a
//! bounded worker pool.
//!
//! ## Modules
//!
//! - [`queue`] - Bounded FIFO operation queue with per-operation cancellation
//! - [`factory`] - Builds reconciliation, download, upload and deletion operations
//! - [`coordinator`] - Composes full sync passes out of factory operations
//! - [`events`] - Fan-out of sync-status-changed events
//! - [`filesystem`] - Local content adapter over `tokio::fs`

pub mod coordinator;
pub mod events;
pub mod factory;
pub mod filesystem;
pub mod queue;

pub use coordinator::{SyncCoordinator, SyncPassReport, SyncTrigger};
pub use events::{SyncEvent, SyncEventPublisher};
pub use factory::{PassCounts, SyncContext, SyncOperationFactory};
pub use filesystem::LocalContentAdapter;
pub use queue::{OperationHandle, OperationQueue, OperationScope, SyncOperation};

use thiserror::Error;

/// Errors surfaced to whoever starts a sync pass
///
/// Per-node failures never appear here; they are persisted as node or
/// transfer state and published as events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another pass is still running on this coordinator
    #[error("A sync pass is already in progress")]
    PassInProgress,

    /// A domain-level error propagated from nodesync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] nodesync_core::domain::DomainError),
}

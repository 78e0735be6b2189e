//! Sync event publisher
//!
//! Broadcasts sync-status-changed events to any number of observers. Events
//! are read-side notifications for UI refresh; nothing in the engine depends
//! on them being received.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use nodesync_core::domain::{ListNode, MarkedFor, SyncStatus};

/// Default number of events buffered per observer
const DEFAULT_CAPACITY: usize = 1024;

/// A node whose sync state changed
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub node: ListNode,
}

impl SyncEvent {
    pub fn new(node: ListNode) -> Self {
        Self { node }
    }

    pub fn guid(&self) -> &str {
        &self.node.guid
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.node.sync_status
    }

    pub fn marked_for(&self) -> MarkedFor {
        self.node.marked_for
    }
}

/// Fan-out publisher for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct SyncEventPublisher {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to every current observer
    pub fn publish(&self, event: SyncEvent) {
        debug!(
            guid = %event.guid(),
            status = %event.sync_status(),
            marked_for = %event.marked_for(),
            "Publishing sync event"
        );
        // No observers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Runs `handler` for every event on its own task
    ///
    /// The task is the observer's delivery queue: events reach `handler` one
    /// at a time in publish order. It ends when every publisher is dropped.
    pub fn spawn_observer<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(SyncEvent) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Sync event observer lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for SyncEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

//! Bounded operation queue
//!
//! A fixed pool of worker tasks pulls operations from one unbounded FIFO
//! channel, so at most `max_concurrent` operations run at once and waiting
//! operations start in submission order. Running operations may submit more
//! operations into the same queue through their [`OperationScope`], which is
//! how recursive folder descent keeps its concurrency under the one limit
//! regardless of tree depth.
//!
//! ```text
//! submit ──► mpsc (FIFO) ──► worker 0 ──► spawn(op) ──► scope.submit(child) ─┐
//!   ▲                    ├─► worker 1                                      │
//!   │                    └─► worker N-1                                    │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation owns a cancellation token. Cancellation is cooperative:
//! an operation cancelled before it starts is skipped, one that is already
//! running observes the token at its next resume point.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

// ============================================================================
// T070: SyncOperation
// ============================================================================

type OperationFn = Box<dyn FnOnce(OperationScope) -> BoxFuture<'static, ()> + Send>;

/// A schedulable unit of sync work
///
/// Operations report nothing back to the queue. Whatever they decide is
/// persisted to the stores and published as events by the operation itself.
pub struct SyncOperation {
    label: String,
    run: OperationFn,
}

impl SyncOperation {
    /// Wraps an async closure as an operation
    ///
    /// # Arguments
    /// * `label` - Short description used in logs
    /// * `run` - Invoked once on a worker with the operation's scope
    pub fn new<F, Fut>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(OperationScope) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(move |scope| Box::pin(run(scope))),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOperation")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Context handed to a running operation
#[derive(Clone)]
pub struct OperationScope {
    id: u64,
    cancel: CancellationToken,
    queue: OperationQueue,
}

impl OperationScope {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Token cancelled when this operation or the whole queue is cancelled
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Submits a follow-up operation into the queue running this one
    pub fn submit(&self, operation: SyncOperation) -> OperationHandle {
        self.queue.submit(operation)
    }
}

/// Handle to a submitted operation
#[derive(Debug, Clone)]
pub struct OperationHandle {
    id: u64,
    cancel: CancellationToken,
}

impl OperationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests cancellation of this operation only
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ============================================================================
// T071: OperationQueue
// ============================================================================

struct Queued {
    id: u64,
    cancel: CancellationToken,
    operation: SyncOperation,
}

struct QueueInner {
    sender: mpsc::UnboundedSender<Queued>,
    /// Tokens of operations that are queued or running
    tokens: DashMap<u64, CancellationToken>,
    next_id: AtomicU64,
    outstanding: AtomicUsize,
    idle: Notify,
    max_concurrent: usize,
}

/// FIFO operation queue backed by a fixed-size worker pool
///
/// Cloning yields another handle to the same queue. Workers exit once the
/// last handle is dropped and the channel has drained.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl OperationQueue {
    /// Creates a queue and spawns its workers on the current runtime
    ///
    /// # Arguments
    /// * `max_concurrent` - Number of workers; clamped to at least one
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(QueueInner {
            sender,
            tokens: DashMap::new(),
            next_id: AtomicU64::new(1),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
            max_concurrent,
        });

        let receiver = Arc::new(Mutex::new(receiver));
        for index in 0..max_concurrent {
            tokio::spawn(worker(index, receiver.clone(), Arc::downgrade(&inner)));
        }
        info!(max_concurrent, "Operation queue started");

        Self { inner }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Number of operations queued or running
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Enqueues an operation behind everything already submitted
    pub fn submit(&self, operation: SyncOperation) -> OperationHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inner.tokens.insert(id, cancel.clone());
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);

        trace!(id, label = %operation.label, "Submitting operation");
        let queued = Queued {
            id,
            cancel: cancel.clone(),
            operation,
        };
        if let Err(mpsc::error::SendError(queued)) = self.inner.sender.send(queued) {
            warn!(id, label = %queued.operation.label, "Queue workers gone, dropping operation");
            self.inner.tokens.remove(&id);
            self.finish_one();
        }

        OperationHandle { id, cancel }
    }

    /// Cancels one queued or running operation
    ///
    /// # Returns
    /// `false` if the operation already finished
    pub fn cancel(&self, id: u64) -> bool {
        match self.inner.tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every queued and running operation
    ///
    /// Operations submitted afterwards are unaffected.
    pub fn cancel_all(&self) {
        let mut cancelled = 0usize;
        for entry in self.inner.tokens.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        info!(cancelled, "Cancelled all queued operations");
    }

    /// Resolves once no operation is queued or running
    ///
    /// Operations that submit follow-ups before finishing keep the queue busy,
    /// so this waits for a whole recursive descent to unwind.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn execute(&self, queued: Queued) {
        let Queued {
            id,
            cancel,
            operation,
        } = queued;
        let SyncOperation { label, run } = operation;

        if cancel.is_cancelled() {
            debug!(id, %label, "Skipping cancelled operation");
        } else {
            let scope = OperationScope {
                id,
                cancel,
                queue: self.clone(),
            };
            trace!(id, %label, "Running operation");
            // A panicking operation must not take its worker down with it
            if let Err(e) = tokio::spawn(run(scope)).await {
                if e.is_panic() {
                    error!(id, %label, "Operation panicked");
                } else {
                    warn!(id, %label, error = %e, "Operation aborted");
                }
            }
        }

        self.inner.tokens.remove(&id);
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

async fn worker(
    index: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Queued>>>,
    inner: Weak<QueueInner>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(queued) = next else {
            break;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        OperationQueue { inner }.execute(queued).await;
    }
    debug!(worker = index, "Operation worker stopped");
}

//! SQLite implementation of ITransferStore
//!
//! Transfers are keyed on `(account_id, local_filename_path)`. Every
//! mutation bumps a revision counter on a `watch` channel; subscriptions
//! re-run their query on each bump and only call back when the result
//! actually changed.

use std::sync::Arc;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::watch;

use nodesync_core::domain::{SyncStatus, UploadTransfer};
use nodesync_core::ports::{ITransferStore, SubscriptionHandle, TransferChangeHandler};

use crate::CacheError;

/// SQLite-backed upload queue for a single account
#[derive(Clone)]
pub struct SqliteTransferStore {
    pool: SqlitePool,
    account_id: String,
    revision: Arc<watch::Sender<u64>>,
}

fn transfer_from_row(row: &SqliteRow) -> Result<UploadTransfer, CacheError> {
    let sync_status: String = row.get("sync_status");
    let is_task_attachment: i64 = row.get("is_task_attachment");

    Ok(UploadTransfer {
        local_id: Some(row.get("id")),
        parent_node_id: row.get("parent_node_id"),
        node_name: row.get("node_name"),
        extension_type: row.get("extension_type"),
        mimetype: row.get("mimetype"),
        node_description: row.get("node_description"),
        local_filename_path: row.get("local_filename_path"),
        sync_status: sync_status.parse()?,
        is_task_attachment: is_task_attachment != 0,
    })
}

fn transfers_from_rows(rows: &[SqliteRow]) -> Result<Vec<UploadTransfer>, CacheError> {
    rows.iter().map(transfer_from_row).collect()
}

impl SqliteTransferStore {
    pub fn new(pool: SqlitePool, account_id: impl Into<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            pool,
            account_id: account_id.into(),
            revision: Arc::new(revision),
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    pub async fn try_store(&self, transfer: &UploadTransfer) -> Result<UploadTransfer, CacheError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO upload_transfers \
             (account_id, parent_node_id, node_name, extension_type, mimetype, \
              node_description, local_filename_path, sync_status, is_task_attachment) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(account_id, local_filename_path) DO UPDATE SET \
              parent_node_id = excluded.parent_node_id, node_name = excluded.node_name, \
              extension_type = excluded.extension_type, mimetype = excluded.mimetype, \
              node_description = excluded.node_description, \
              sync_status = excluded.sync_status, \
              is_task_attachment = excluded.is_task_attachment \
             RETURNING id",
        )
        .bind(&self.account_id)
        .bind(&transfer.parent_node_id)
        .bind(&transfer.node_name)
        .bind(&transfer.extension_type)
        .bind(&transfer.mimetype)
        .bind(&transfer.node_description)
        .bind(&transfer.local_filename_path)
        .bind(transfer.sync_status.as_str())
        .bind(transfer.is_task_attachment as i64)
        .fetch_one(&self.pool)
        .await?;

        self.bump();
        tracing::trace!(
            path = %transfer.local_filename_path,
            status = %transfer.sync_status,
            "Stored upload transfer"
        );

        let mut stored = transfer.clone();
        stored.local_id = Some(id);
        Ok(stored)
    }

    pub async fn try_remove(&self, transfer: &UploadTransfer) -> Result<u64, CacheError> {
        let result = sqlx::query(
            "DELETE FROM upload_transfers WHERE account_id = ? AND local_filename_path = ?",
        )
        .bind(&self.account_id)
        .bind(&transfer.local_filename_path)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            self.bump();
        }
        Ok(result.rows_affected())
    }

    pub async fn try_query_all(&self, is_task_attachment: bool) -> Result<Vec<UploadTransfer>, CacheError> {
        let rows = sqlx::query(
            "SELECT * FROM upload_transfers \
             WHERE account_id = ? AND is_task_attachment = ? AND sync_status NOT IN (?, ?) \
             ORDER BY id",
        )
        .bind(&self.account_id)
        .bind(is_task_attachment as i64)
        .bind(SyncStatus::Synced.as_str())
        .bind(SyncStatus::InProgress.as_str())
        .fetch_all(&self.pool)
        .await?;
        transfers_from_rows(&rows)
    }

    pub async fn try_query_for_parent(&self, parent_node_id: &str) -> Result<Vec<UploadTransfer>, CacheError> {
        let rows = sqlx::query(
            "SELECT * FROM upload_transfers \
             WHERE account_id = ? AND parent_node_id = ? \
             ORDER BY node_name COLLATE NOCASE, id",
        )
        .bind(&self.account_id)
        .bind(parent_node_id)
        .fetch_all(&self.pool)
        .await?;
        transfers_from_rows(&rows)
    }

    pub async fn try_requeue_interrupted(&self) -> Result<u64, CacheError> {
        let result = sqlx::query(
            "UPDATE upload_transfers SET sync_status = ? \
             WHERE account_id = ? AND sync_status = ?",
        )
        .bind(SyncStatus::Pending.as_str())
        .bind(&self.account_id)
        .bind(SyncStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            self.bump();
        }
        Ok(result.rows_affected())
    }
}

// ============================================================================
// ITransferStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ITransferStore for SqliteTransferStore {
    async fn store(&self, transfer: &UploadTransfer) -> Option<UploadTransfer> {
        match self.try_store(transfer).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::error!(
                    path = %transfer.local_filename_path,
                    error = %e,
                    "Failed to store upload transfer"
                );
                None
            }
        }
    }

    async fn remove(&self, transfer: &UploadTransfer) {
        if let Err(e) = self.try_remove(transfer).await {
            tracing::error!(
                path = %transfer.local_filename_path,
                error = %e,
                "Failed to remove upload transfer"
            );
        }
    }

    async fn query_all(&self, is_task_attachment: bool) -> Vec<UploadTransfer> {
        self.try_query_all(is_task_attachment)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to query pending transfers");
                Vec::new()
            })
    }

    async fn query_for_parent(&self, parent_node_id: &str) -> Vec<UploadTransfer> {
        self.try_query_for_parent(parent_node_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(parent = %parent_node_id, error = %e, "Failed to query transfers");
                Vec::new()
            })
    }

    async fn requeue_interrupted(&self) -> u64 {
        match self.try_requeue_interrupted().await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!(count, "Requeued interrupted upload transfers");
                }
                count
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to requeue interrupted transfers");
                0
            }
        }
    }

    async fn subscribe(
        &self,
        parent_node_id: &str,
        handler: TransferChangeHandler,
    ) -> SubscriptionHandle {
        let store = self.clone();
        let parent = parent_node_id.to_string();
        let mut revisions = self.revision.subscribe();

        let task = tokio::spawn(async move {
            let mut last: Option<Vec<UploadTransfer>> = None;
            loop {
                let _ = revisions.borrow_and_update();
                let current = store.query_for_parent(&parent).await;
                if last.as_ref() != Some(&current) {
                    handler(current.clone());
                    last = Some(current);
                }
                if revisions.changed().await.is_err() {
                    break;
                }
            }
            tracing::trace!(parent = %parent, "Transfer subscription ended");
        });

        SubscriptionHandle::new(move || task.abort())
    }
}

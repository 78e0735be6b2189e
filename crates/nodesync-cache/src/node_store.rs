//! SQLite implementation of INodeStore
//!
//! Every store instance is scoped to one account. Inherent `try_*` methods
//! return `CacheError`; the port implementation logs those errors and
//! degrades to "not found" or a no-op.
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                              |
//! |--------------------------|----------|---------------------------------------|
//! | NodeType, SyncStatus, MarkedFor | TEXT | `as_str()` / `FromStr`          |
//! | DateTime<Utc>            | TEXT     | ISO 8601 via `to_rfc3339()`           |
//! | Vec<AllowableOperation>  | TEXT     | serde_json array                      |
//! | bool / Option<bool>      | INTEGER  | 0/1, NULL for unset favorite          |

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use nodesync_core::domain::{ContentPaths, ListNode, MarkedFor, SyncStatus};
use nodesync_core::ports::{INodeStore, StatusCounts};

use crate::CacheError;

const SELECT_NODE: &str = "SELECT * FROM list_nodes WHERE account_id = ?";
const ORDER_BY_TITLE: &str = " ORDER BY title COLLATE NOCASE, id";

/// SQLite-backed node cache for a single account
#[derive(Clone)]
pub struct SqliteNodeStore {
    pool: SqlitePool,
    account_id: String,
    paths: ContentPaths,
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn node_from_row(row: &SqliteRow) -> Result<ListNode, CacheError> {
    let node_type: String = row.get("node_type");
    let sync_status: String = row.get("sync_status");
    let marked_for: String = row.get("marked_for");
    let modified_at: Option<String> = row.get("modified_at");
    let operations: String = row.get("allowable_operations");
    let offline: i64 = row.get("marked_as_offline");
    let favorite: Option<i64> = row.get("favorite");

    Ok(ListNode {
        local_id: Some(row.get("id")),
        guid: row.get("guid"),
        parent_guid: row.get("parent_guid"),
        title: row.get("title"),
        mime_type: row.get("mime_type"),
        node_type: node_type.parse()?,
        modified_at: modified_at.as_deref().map(parse_datetime).transpose()?,
        path: row.get("path"),
        allowable_operations: serde_json::from_str(&operations).map_err(|e| {
            CacheError::SerializationError(format!("Invalid allowable_operations JSON: {}", e))
        })?,
        sync_status: sync_status.parse()?,
        marked_for: marked_for.parse()?,
        marked_as_offline: offline != 0,
        favorite: favorite.map(|f| f != 0),
    })
}

fn nodes_from_rows(rows: &[SqliteRow]) -> Result<Vec<ListNode>, CacheError> {
    rows.iter().map(node_from_row).collect()
}

async fn delete_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::trace!(path = %path.display(), "Deleted cached content"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete cached content")
        }
    }
}

impl SqliteNodeStore {
    /// Creates a store for `account_id` over the given pool
    pub fn new(pool: SqlitePool, account_id: impl Into<String>, paths: ContentPaths) -> Self {
        Self {
            pool,
            account_id: account_id.into(),
            paths,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn paths(&self) -> &ContentPaths {
        &self.paths
    }

    async fn fetch_nodes(&self, filter: &str, bind: Option<&str>) -> Result<Vec<ListNode>, CacheError> {
        let sql = format!("{SELECT_NODE}{filter}{ORDER_BY_TITLE}");
        let mut query = sqlx::query(&sql).bind(&self.account_id);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        nodes_from_rows(&rows)
    }

    pub async fn try_query_by_guid(&self, guid: &str) -> Result<Option<ListNode>, CacheError> {
        let sql = format!("{SELECT_NODE} AND guid = ?");
        let row = sqlx::query(&sql)
            .bind(&self.account_id)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    pub async fn try_query_by_id(&self, id: i64) -> Result<Option<ListNode>, CacheError> {
        let sql = format!("{SELECT_NODE} AND id = ?");
        let row = sqlx::query(&sql)
            .bind(&self.account_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    pub async fn try_query(&self, node: &ListNode) -> Result<Option<ListNode>, CacheError> {
        if let Some(id) = node.local_id {
            if let Some(found) = self.try_query_by_id(id).await? {
                return Ok(Some(found));
            }
        }
        if node.is_local_only() {
            return Ok(None);
        }
        self.try_query_by_guid(&node.guid).await
    }

    /// Upserts a node, merging into the existing record when found by guid
    pub async fn try_store(&self, node: &ListNode) -> Result<ListNode, CacheError> {
        let mut record = node.clone();
        if record.local_id.is_none() && !record.is_local_only() {
            if let Some(mut existing) = self.try_query_by_guid(&node.guid).await? {
                existing.update_with(node);
                record = existing;
            }
        }
        record.strip_unknown_operations();

        let operations = serde_json::to_string(&record.allowable_operations).map_err(|e| {
            CacheError::SerializationError(format!("Failed to serialize allowable_operations: {}", e))
        })?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO list_nodes \
             (id, account_id, guid, parent_guid, title, mime_type, node_type, modified_at, \
              path, allowable_operations, sync_status, marked_for, marked_as_offline, favorite) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              guid = excluded.guid, parent_guid = excluded.parent_guid, title = excluded.title, \
              mime_type = excluded.mime_type, node_type = excluded.node_type, \
              modified_at = excluded.modified_at, path = excluded.path, \
              allowable_operations = excluded.allowable_operations, \
              sync_status = excluded.sync_status, marked_for = excluded.marked_for, \
              marked_as_offline = excluded.marked_as_offline, favorite = excluded.favorite \
             RETURNING id",
        )
        .bind(record.local_id)
        .bind(&self.account_id)
        .bind(&record.guid)
        .bind(&record.parent_guid)
        .bind(&record.title)
        .bind(&record.mime_type)
        .bind(record.node_type.as_str())
        .bind(record.modified_at.map(|dt| dt.to_rfc3339()))
        .bind(&record.path)
        .bind(&operations)
        .bind(record.sync_status.as_str())
        .bind(record.marked_for.as_str())
        .bind(record.marked_as_offline as i64)
        .bind(record.favorite.map(|f| f as i64))
        .fetch_one(&self.pool)
        .await?;

        record.local_id = Some(id);
        tracing::trace!(
            guid = %record.guid,
            local_id = id,
            status = %record.sync_status,
            marked_for = %record.marked_for,
            "Stored node"
        );
        Ok(record)
    }

    pub async fn try_query_children(&self, parent_guid: &str) -> Result<Vec<ListNode>, CacheError> {
        self.fetch_nodes(" AND parent_guid = ?", Some(parent_guid)).await
    }

    pub async fn try_query_marked_offline(&self) -> Result<Vec<ListNode>, CacheError> {
        self.fetch_nodes(" AND marked_as_offline = 1", None).await
    }

    pub async fn try_query_marked_for(&self, marked_for: MarkedFor) -> Result<Vec<ListNode>, CacheError> {
        self.fetch_nodes(" AND marked_for = ?", Some(marked_for.as_str()))
            .await
    }

    /// Removes a node and its unpinned descendants, deepest first
    pub async fn try_remove(&self, node: &ListNode) -> Result<u64, CacheError> {
        let root = match self.try_query(node).await? {
            Some(found) => found,
            None => node.clone(),
        };

        // Pre-order walk; reversed, it deletes every child before its parent
        let mut doomed = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if current.is_container() && !current.is_local_only() {
                for child in self.try_query_children(&current.guid).await? {
                    if child.marked_as_offline {
                        tracing::debug!(
                            guid = %child.guid,
                            parent = %current.guid,
                            "Keeping offline-pinned descendant"
                        );
                        continue;
                    }
                    stack.push(child);
                }
            }
            doomed.push(current);
        }

        let mut removed = 0;
        for victim in doomed.iter().rev() {
            self.delete_content(victim).await;
            removed += self.delete_record(victim).await?;
        }

        tracing::debug!(guid = %node.guid, removed, "Removed node");
        Ok(removed)
    }

    async fn delete_record(&self, node: &ListNode) -> Result<u64, CacheError> {
        let result = match node.local_id {
            Some(id) => {
                sqlx::query("DELETE FROM list_nodes WHERE account_id = ? AND id = ?")
                    .bind(&self.account_id)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            None if !node.is_local_only() => {
                sqlx::query("DELETE FROM list_nodes WHERE account_id = ? AND guid = ?")
                    .bind(&self.account_id)
                    .bind(&node.guid)
                    .execute(&self.pool)
                    .await?
            }
            None => return Ok(0),
        };
        Ok(result.rows_affected())
    }

    async fn delete_content(&self, node: &ListNode) {
        if node.is_local_only() {
            return;
        }
        let content = self
            .paths
            .file_local_path(&self.account_id, &node.guid, &node.title);
        let rendition = self
            .paths
            .rendition_local_path(&self.account_id, &node.guid, &node.title);
        delete_file(&content).await;
        delete_file(&rendition).await;

        // Drop the per-node directories once empty
        for dir in [rendition.parent(), content.parent()].into_iter().flatten() {
            let _ = tokio::fs::remove_dir(dir).await;
        }
    }

    pub async fn try_count_by_status(&self) -> Result<StatusCounts, CacheError> {
        let rows = sqlx::query(
            "SELECT sync_status, COUNT(*) AS count FROM list_nodes \
             WHERE account_id = ? GROUP BY sync_status",
        )
        .bind(&self.account_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::new();
        for row in &rows {
            let status: String = row.get("sync_status");
            let count: i64 = row.get("count");
            counts.insert(status.parse::<SyncStatus>()?, count as u64);
        }
        Ok(counts)
    }
}

fn degrade<T: Default>(result: Result<T, CacheError>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Node store {} failed", what);
        T::default()
    })
}

// ============================================================================
// INodeStore implementation
// ============================================================================

#[async_trait::async_trait]
impl INodeStore for SqliteNodeStore {
    async fn store(&self, node: &ListNode) -> Option<ListNode> {
        match self.try_store(node).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::error!(guid = %node.guid, error = %e, "Failed to store node");
                None
            }
        }
    }

    async fn query(&self, node: &ListNode) -> Option<ListNode> {
        self.try_query(node).await.unwrap_or_else(|e| {
            tracing::warn!(guid = %node.guid, error = %e, "Failed to query node");
            None
        })
    }

    async fn query_children(&self, parent_guid: &str) -> Vec<ListNode> {
        degrade(self.try_query_children(parent_guid).await, "children query")
    }

    async fn query_marked_offline(&self) -> Vec<ListNode> {
        degrade(self.try_query_marked_offline().await, "offline query")
    }

    async fn query_marked_for_deletion(&self) -> Vec<ListNode> {
        degrade(self.try_query_marked_for(MarkedFor::Removal).await, "removal query")
    }

    async fn query_marked_for_download(&self) -> Vec<ListNode> {
        degrade(self.try_query_marked_for(MarkedFor::Download).await, "download query")
    }

    async fn remove(&self, node: &ListNode) {
        if let Err(e) = self.try_remove(node).await {
            tracing::error!(guid = %node.guid, error = %e, "Failed to remove node");
        }
    }

    async fn count_by_status(&self) -> StatusCounts {
        degrade(self.try_count_by_status().await, "status count")
    }
}

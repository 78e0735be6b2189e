//! Shared fixtures for sync engine tests
//!
//! [`FakeGateway`] serves a scripted remote tree from memory; the node and
//! transfer stores are the real SQLite adapters over an in-memory database.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use nodesync_cache::{DatabasePool, SqliteNodeStore, SqliteTransferStore};
use nodesync_core::domain::{ContentPaths, ListNode};
use nodesync_core::ports::{INodeStore, IRemoteGateway, NewNode, NodePage, RemoteError};
use nodesync_sync::{
    LocalContentAdapter, SyncContext, SyncCoordinator, SyncEvent, SyncEventPublisher,
};

pub const ACCOUNT: &str = "alice";

pub fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

pub fn t2() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
}

/// Remote file as the gateway would return it
pub fn remote_file(guid: &str, parent: &str, title: &str, modified_at: DateTime<Utc>) -> ListNode {
    let mut node = ListNode::file(guid, parent, title);
    node.modified_at = Some(modified_at);
    node.mime_type = Some("text/plain".to_string());
    node
}

// ============================================================================
// FakeGateway
// ============================================================================

#[derive(Default)]
struct FakeState {
    children: HashMap<String, Vec<ListNode>>,
    details: HashMap<String, ListNode>,
    failures: HashMap<String, u16>,
    contents: HashMap<String, Vec<u8>>,
    renditions: HashMap<String, String>,
    rendition_bodies: HashMap<String, Vec<u8>>,
    upload_failures: u32,
    hang_downloads: bool,
    list_calls: Vec<(String, u32)>,
    download_calls: Vec<String>,
    created: Vec<NewNode>,
}

/// In-memory remote repository
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn set_children(&self, parent: &str, nodes: Vec<ListNode>) {
        self.state.lock().unwrap().children.insert(parent.to_string(), nodes);
    }

    pub fn set_detail(&self, node: ListNode) {
        self.state.lock().unwrap().details.insert(node.guid.clone(), node);
    }

    /// Makes every call about `key` fail with `status`
    ///
    /// `key` is a node guid, or a rendition url for `download_url`.
    pub fn fail(&self, key: &str, status: u16) {
        self.state.lock().unwrap().failures.insert(key.to_string(), status);
    }

    /// Undoes `fail`
    pub fn recover(&self, key: &str) {
        self.state.lock().unwrap().failures.remove(key);
    }

    pub fn set_content(&self, guid: &str, bytes: &[u8]) {
        self.state.lock().unwrap().contents.insert(guid.to_string(), bytes.to_vec());
    }

    pub fn set_rendition(&self, guid: &str, url: &str, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.renditions.insert(guid.to_string(), url.to_string());
        state.rendition_bodies.insert(url.to_string(), bytes.to_vec());
    }

    /// Fails the next `count` uploads with a network error
    pub fn fail_next_uploads(&self, count: u32) {
        self.state.lock().unwrap().upload_failures = count;
    }

    /// Downloads write a partial file and then wait for cancellation
    pub fn hang_downloads(&self) {
        self.state.lock().unwrap().hang_downloads = true;
    }

    pub fn list_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().download_calls.clone()
    }

    pub fn created(&self) -> Vec<NewNode> {
        self.state.lock().unwrap().created.clone()
    }

    fn failure(&self, guid: &str) -> Option<RemoteError> {
        self.state
            .lock()
            .unwrap()
            .failures
            .get(guid)
            .map(|status| RemoteError::from_status(*status, format!("{guid} unavailable")))
    }
}

#[async_trait::async_trait]
impl IRemoteGateway for FakeGateway {
    async fn list_children(
        &self,
        parent_guid: &str,
        skip_count: u32,
        max_items: u32,
    ) -> Result<NodePage, RemoteError> {
        self.state
            .lock()
            .unwrap()
            .list_calls
            .push((parent_guid.to_string(), skip_count));
        if let Some(e) = self.failure(parent_guid) {
            return Err(e);
        }

        let all = self
            .state
            .lock()
            .unwrap()
            .children
            .get(parent_guid)
            .cloned()
            .unwrap_or_default();
        let total = all.len() as u32;
        let nodes: Vec<ListNode> = all
            .into_iter()
            .skip(skip_count as usize)
            .take(max_items as usize)
            .collect();
        let count = nodes.len() as u32;
        Ok(NodePage {
            nodes,
            skip_count,
            max_items,
            total_items: Some(total),
            has_more_items: skip_count + count < total,
        })
    }

    async fn node_detail(&self, guid: &str) -> Result<ListNode, RemoteError> {
        if let Some(e) = self.failure(guid) {
            return Err(e);
        }
        let state = self.state.lock().unwrap();
        state
            .details
            .get(guid)
            .cloned()
            .or_else(|| {
                state
                    .children
                    .values()
                    .flatten()
                    .find(|n| n.guid == guid)
                    .cloned()
            })
            .ok_or_else(|| RemoteError::NotFound(guid.to_string()))
    }

    async fn rendition_url(&self, guid: &str) -> Result<Option<String>, RemoteError> {
        Ok(self.state.lock().unwrap().renditions.get(guid).cloned())
    }

    async fn download_content(
        &self,
        guid: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError> {
        let (hang, content) = {
            let mut state = self.state.lock().unwrap();
            state.download_calls.push(guid.to_string());
            (state.hang_downloads, state.contents.get(guid).cloned())
        };
        if let Some(e) = self.failure(guid) {
            return Err(e);
        }

        if hang {
            tokio::fs::write(destination, b"partial").await?;
            cancel.cancelled().await;
            return Ok(None);
        }

        let content = content.ok_or_else(|| RemoteError::NotFound(guid.to_string()))?;
        tokio::fs::write(destination, content).await?;
        Ok(Some(destination.to_path_buf()))
    }

    async fn download_url(
        &self,
        url: &str,
        destination: &Path,
        _cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError> {
        if let Some(e) = self.failure(url) {
            return Err(e);
        }
        let body = self
            .state
            .lock()
            .unwrap()
            .rendition_bodies
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::InvalidUrl(url.to_string()))?;
        tokio::fs::write(destination, body).await?;
        Ok(Some(destination.to_path_buf()))
    }

    async fn create_node(&self, node: NewNode) -> Result<ListNode, RemoteError> {
        let mut state = self.state.lock().unwrap();
        if state.upload_failures > 0 {
            state.upload_failures -= 1;
            return Err(RemoteError::Network("connection reset by peer".to_string()));
        }
        let guid = format!("created-{}", state.created.len() + 1);
        let created = ListNode::file(guid, node.parent_guid.clone(), node.name.clone());
        state.created.push(node);
        Ok(created)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub paths: ContentPaths,
    pub nodes: Arc<SqliteNodeStore>,
    pub transfers: Arc<SqliteTransferStore>,
    pub gateway: Arc<FakeGateway>,
    pub publisher: SyncEventPublisher,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::in_memory().await.unwrap();
        let paths = ContentPaths::new(dir.path().join("content"), dir.path().join("uploads"));
        Self {
            nodes: Arc::new(SqliteNodeStore::new(pool.pool().clone(), ACCOUNT, paths.clone())),
            transfers: Arc::new(SqliteTransferStore::new(pool.pool().clone(), ACCOUNT)),
            gateway: Arc::new(FakeGateway::default()),
            publisher: SyncEventPublisher::default(),
            paths,
            dir,
        }
    }

    pub fn context(&self, page_size: u32) -> SyncContext {
        SyncContext {
            node_store: self.nodes.clone(),
            transfer_store: self.transfers.clone(),
            gateway: self.gateway.clone(),
            local: Arc::new(LocalContentAdapter::new()),
            publisher: self.publisher.clone(),
            paths: self.paths.clone(),
            account_id: ACCOUNT.to_string(),
            page_size,
        }
    }

    pub fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(self.context(100), 4)
    }

    /// Stores `node` pinned for offline use
    pub async fn pin(&self, mut node: ListNode) -> ListNode {
        node.marked_as_offline = true;
        self.nodes.store(&node).await.unwrap()
    }

    pub async fn node(&self, guid: &str) -> Option<ListNode> {
        self.nodes.try_query_by_guid(guid).await.unwrap()
    }

    pub fn content_path(&self, node: &ListNode) -> PathBuf {
        self.paths.file_local_path(ACCOUNT, &node.guid, &node.title)
    }

    pub fn rendition_path(&self, node: &ListNode) -> PathBuf {
        self.paths.rendition_local_path(ACCOUNT, &node.guid, &node.title)
    }

    pub fn write_content(&self, node: &ListNode, bytes: &[u8]) {
        let path = self.content_path(node);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    /// Writes a file into the account's upload sandbox
    pub fn write_upload(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.paths.upload_local_path(ACCOUNT, relative).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

/// Events received so far without waiting
pub fn drain(receiver: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Polls until `check` holds or two seconds have passed
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

//! Integration tests for SqliteNodeStore
//!
//! Each test creates a fresh in-memory database and a temporary content
//! directory so cached-file deletion can be observed.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use nodesync_cache::{DatabasePool, SqliteNodeStore};
use nodesync_core::domain::{
    AllowableOperation, ContentPaths, ListNode, MarkedFor, NodeType, SyncStatus,
};
use nodesync_core::ports::INodeStore;

// ============================================================================
// Test helpers
// ============================================================================

const ACCOUNT: &str = "alice";

async fn setup() -> (SqliteNodeStore, TempDir) {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let dir = tempfile::tempdir().unwrap();
    let paths = ContentPaths::new(dir.path().join("content"), dir.path().join("uploads"));
    (
        SqliteNodeStore::new(pool.pool().clone(), ACCOUNT, paths),
        dir,
    )
}

async fn write_content(store: &SqliteNodeStore, node: &ListNode) -> std::path::PathBuf {
    let path = store.paths().file_local_path(ACCOUNT, &node.guid, &node.title);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"content").unwrap();
    path
}

// ============================================================================
// store / query
// ============================================================================

#[tokio::test]
async fn test_store_inserts_and_assigns_local_id() {
    let (store, _dir) = setup().await;
    let mut node = ListNode::file("a", "root", "a.txt");
    node.mime_type = Some("text/plain".to_string());
    node.modified_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    node.allowable_operations = vec![AllowableOperation::Update, AllowableOperation::Unknown];
    node.favorite = Some(true);

    let stored = store.store(&node).await.unwrap();
    assert!(stored.local_id.is_some());
    assert_eq!(stored.allowable_operations, vec![AllowableOperation::Update]);

    let fetched = store.query(&ListNode::file("a", "", "")).await.unwrap();
    assert_eq!(fetched, stored);
}

#[tokio::test]
async fn test_store_merge_preserves_offline_pin() {
    let (store, _dir) = setup().await;
    let mut pinned = ListNode::folder("f", "root", "Projects");
    pinned.marked_as_offline = true;
    let original = store.store(&pinned).await.unwrap();

    // Remote snapshots never carry the pin
    let mut snapshot = ListNode::folder("f", "root", "Projects 2026");
    snapshot.sync_status = SyncStatus::Synced;
    let merged = store.store(&snapshot).await.unwrap();

    assert_eq!(merged.local_id, original.local_id);
    assert!(merged.marked_as_offline);
    assert_eq!(merged.title, "Projects 2026");
    assert_eq!(merged.sync_status, SyncStatus::Synced);

    let all = store.query_children("root").await;
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_store_with_local_id_updates_in_place() {
    let (store, _dir) = setup().await;
    let mut stored = store.store(&ListNode::file("a", "root", "a.txt")).await.unwrap();

    stored.marked_as_offline = true;
    stored.marked_for = MarkedFor::Download;
    let updated = store.store(&stored).await.unwrap();

    assert_eq!(updated.local_id, stored.local_id);
    let fetched = store.query(&updated).await.unwrap();
    assert!(fetched.marked_as_offline);
    assert_eq!(fetched.marked_for, MarkedFor::Download);
}

#[tokio::test]
async fn test_local_only_nodes_are_not_merged() {
    let (store, _dir) = setup().await;
    let first = store.store(&ListNode::file("0", "root", "one.jpg")).await.unwrap();
    let second = store.store(&ListNode::file("0", "root", "two.jpg")).await.unwrap();

    assert_ne!(first.local_id, second.local_id);
    assert_eq!(store.query_children("root").await.len(), 2);
    assert!(store.query(&ListNode::file("0", "root", "one.jpg")).await.is_none());
}

#[tokio::test]
async fn test_query_missing_node_is_none() {
    let (store, _dir) = setup().await;
    assert!(store.query(&ListNode::file("nope", "root", "x")).await.is_none());
}

#[tokio::test]
async fn test_queries_are_title_ordered() {
    let (store, _dir) = setup().await;
    for (guid, title) in [("c", "charlie.txt"), ("a", "Alpha.txt"), ("b", "bravo.txt")] {
        let mut node = ListNode::file(guid, "root", title);
        node.marked_for = MarkedFor::Download;
        node.marked_as_offline = true;
        store.store(&node).await.unwrap();
    }

    let titles = |nodes: Vec<ListNode>| nodes.into_iter().map(|n| n.title).collect::<Vec<_>>();
    let expected = vec!["Alpha.txt", "bravo.txt", "charlie.txt"];
    assert_eq!(titles(store.query_children("root").await), expected);
    assert_eq!(titles(store.query_marked_offline().await), expected);
    assert_eq!(titles(store.query_marked_for_download().await), expected);
}

#[tokio::test]
async fn test_marked_queries_filter() {
    let (store, _dir) = setup().await;
    let mut gone = ListNode::file("gone", "root", "gone.txt");
    gone.marked_for = MarkedFor::Removal;
    store.store(&gone).await.unwrap();
    let mut dirty = ListNode::file("dirty", "root", "dirty.txt");
    dirty.marked_for = MarkedFor::Download;
    store.store(&dirty).await.unwrap();
    store.store(&ListNode::file("clean", "root", "clean.txt")).await.unwrap();

    let deletion = store.query_marked_for_deletion().await;
    assert_eq!(deletion.len(), 1);
    assert_eq!(deletion[0].guid, "gone");

    let download = store.query_marked_for_download().await;
    assert_eq!(download.len(), 1);
    assert_eq!(download[0].guid, "dirty");

    assert!(store.query_marked_offline().await.is_empty());
}

#[tokio::test]
async fn test_stores_are_account_scoped() {
    let pool = DatabasePool::in_memory().await.unwrap();
    let paths = ContentPaths::new("/tmp/c", "/tmp/u");
    let alice = SqliteNodeStore::new(pool.pool().clone(), "alice", paths.clone());
    let bob = SqliteNodeStore::new(pool.pool().clone(), "bob", paths);

    alice.store(&ListNode::file("a", "root", "a.txt")).await.unwrap();
    bob.store(&ListNode::file("a", "root", "a.txt")).await.unwrap();

    assert_eq!(alice.query_children("root").await.len(), 1);
    assert_eq!(bob.query_children("root").await.len(), 1);
}

// ============================================================================
// remove
// ============================================================================

#[tokio::test]
async fn test_remove_cascades_and_spares_pinned_descendants() {
    let (store, _dir) = setup().await;

    let folder = store.store(&ListNode::folder("f", "root", "Folder")).await.unwrap();
    let sub = store.store(&ListNode::folder("s", "f", "Sub")).await.unwrap();
    let leaf = store.store(&ListNode::file("l", "s", "leaf.txt")).await.unwrap();
    let mut pinned = ListNode::file("p", "f", "pinned.txt");
    pinned.marked_as_offline = true;
    let pinned = store.store(&pinned).await.unwrap();

    let leaf_path = write_content(&store, &leaf).await;
    let pinned_path = write_content(&store, &pinned).await;

    store.remove(&folder).await;

    assert!(store.query(&folder).await.is_none());
    assert!(store.query(&sub).await.is_none());
    assert!(store.query(&leaf).await.is_none());
    assert!(!leaf_path.exists());

    // Orphaned but kept
    assert!(store.query(&pinned).await.is_some());
    assert!(pinned_path.exists());
}

#[tokio::test]
async fn test_remove_deletes_content_and_rendition() {
    let (store, dir) = setup().await;
    let mut node = ListNode::file("doc", "root", "report.docx");
    node.node_type = NodeType::File;
    let node = store.store(&node).await.unwrap();

    let content = write_content(&store, &node).await;
    let rendition = store.paths().rendition_local_path(ACCOUNT, "doc", "report.docx");
    std::fs::create_dir_all(rendition.parent().unwrap()).unwrap();
    std::fs::write(&rendition, b"%PDF").unwrap();

    store.remove(&node).await;

    assert!(!content.exists());
    assert!(!rendition.exists());
    assert!(!dir.path().join("content").join(ACCOUNT).join("doc").exists());
    assert!(store.query(&node).await.is_none());
}

#[tokio::test]
async fn test_remove_pinned_node_itself_when_asked() {
    let (store, _dir) = setup().await;
    let mut pinned = ListNode::file("p", "root", "pinned.txt");
    pinned.marked_as_offline = true;
    let pinned = store.store(&pinned).await.unwrap();

    store.remove(&pinned).await;
    assert!(store.query(&pinned).await.is_none());
}

#[tokio::test]
async fn test_remove_without_content_on_disk() {
    let (store, _dir) = setup().await;
    let node = store.store(&ListNode::file("a", "root", "a.txt")).await.unwrap();
    store.remove(&node).await;
    assert!(store.query(&node).await.is_none());
}

// ============================================================================
// count_by_status
// ============================================================================

#[tokio::test]
async fn test_count_by_status() {
    let (store, _dir) = setup().await;
    for (guid, status) in [
        ("a", SyncStatus::Synced),
        ("b", SyncStatus::Synced),
        ("c", SyncStatus::Error),
    ] {
        let mut node = ListNode::file(guid, "root", guid);
        node.sync_status = status;
        store.store(&node).await.unwrap();
    }

    let counts = store.count_by_status().await;
    assert_eq!(counts.get(&SyncStatus::Synced), Some(&2));
    assert_eq!(counts.get(&SyncStatus::Error), Some(&1));
    assert_eq!(counts.get(&SyncStatus::Pending), None);
}

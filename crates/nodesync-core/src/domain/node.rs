//! ListNode domain entity
//!
//! A `ListNode` is the local-cache projection of a remote file or folder.
//! The remote repository is authoritative for everything except the
//! local-only fields (`local_id`, `marked_as_offline`), which survive every
//! merge with a fresh remote snapshot.
//!
//! ## Sync status transitions
//!
//! ```text
//!   Pending ──► InProgress ──► Synced
//!                   │
//!                   └────────► Error   (retried on next pass)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Guid carried by nodes that only exist locally (pending uploads)
pub const LOCAL_ONLY_GUID: &str = "0";

// ============================================================================
// T010: NodeType enum
// ============================================================================

/// Kind of content node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    #[default]
    File,
    Folder,
    FolderLink,
    Site,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Folder => "folder",
            NodeType::FolderLink => "folderLink",
            NodeType::Site => "site",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(NodeType::File),
            "folder" => Ok(NodeType::Folder),
            "folderLink" => Ok(NodeType::FolderLink),
            "site" => Ok(NodeType::Site),
            other => Err(DomainError::InvalidNodeType(other.to_string())),
        }
    }
}

// ============================================================================
// T011: SyncStatus enum
// ============================================================================

/// Convergence state of a node or transfer with its remote counterpart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    #[default]
    Undefined,
    Pending,
    InProgress,
    Synced,
    Error,
}

impl SyncStatus {
    /// All statuses, in declaration order
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Undefined,
        SyncStatus::Pending,
        SyncStatus::InProgress,
        SyncStatus::Synced,
        SyncStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Undefined => "undefined",
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "inProgress",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::InvalidSyncStatus(s.to_string()))
    }
}

// ============================================================================
// T012: MarkedFor enum
// ============================================================================

/// Pending action the sync engine has scheduled for a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkedFor {
    #[default]
    Undefined,
    Upload,
    Download,
    Removal,
}

impl MarkedFor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkedFor::Undefined => "undefined",
            MarkedFor::Upload => "upload",
            MarkedFor::Download => "download",
            MarkedFor::Removal => "removal",
        }
    }
}

impl fmt::Display for MarkedFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkedFor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undefined" => Ok(MarkedFor::Undefined),
            "upload" => Ok(MarkedFor::Upload),
            "download" => Ok(MarkedFor::Download),
            "removal" => Ok(MarkedFor::Removal),
            other => Err(DomainError::InvalidMarkedFor(other.to_string())),
        }
    }
}

// ============================================================================
// T013: AllowableOperation enum
// ============================================================================

/// Capability the remote repository grants the current user on a node
///
/// Values the client does not understand deserialize to `Unknown` and are
/// stripped before the node is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllowableOperation {
    Create,
    Update,
    Delete,
    UpdatePermissions,
    #[serde(other)]
    Unknown,
}

// ============================================================================
// T014: ListNode struct
// ============================================================================

/// Cached projection of a remote file or folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListNode {
    /// Row identity in the local store, `None` until first persisted
    pub local_id: Option<i64>,
    /// Remote identity, [`LOCAL_ONLY_GUID`] for nodes not yet created remotely
    pub guid: String,
    pub parent_guid: String,
    pub title: String,
    pub mime_type: Option<String>,
    pub node_type: NodeType,
    pub modified_at: Option<DateTime<Utc>>,
    /// Display path of the parent folder in the remote repository
    pub path: String,
    pub allowable_operations: Vec<AllowableOperation>,
    pub sync_status: SyncStatus,
    pub marked_for: MarkedFor,
    /// Explicit user pin for offline availability
    pub marked_as_offline: bool,
    pub favorite: Option<bool>,
}

impl ListNode {
    /// Creates a file node with default sync state
    pub fn file(guid: impl Into<String>, parent_guid: impl Into<String>, title: impl Into<String>) -> Self {
        Self::with_type(guid, parent_guid, title, NodeType::File)
    }

    /// Creates a folder node with default sync state
    pub fn folder(guid: impl Into<String>, parent_guid: impl Into<String>, title: impl Into<String>) -> Self {
        Self::with_type(guid, parent_guid, title, NodeType::Folder)
    }

    fn with_type(
        guid: impl Into<String>,
        parent_guid: impl Into<String>,
        title: impl Into<String>,
        node_type: NodeType,
    ) -> Self {
        Self {
            local_id: None,
            guid: guid.into(),
            parent_guid: parent_guid.into(),
            title: title.into(),
            mime_type: None,
            node_type,
            modified_at: None,
            path: String::new(),
            allowable_operations: Vec::new(),
            sync_status: SyncStatus::Undefined,
            marked_for: MarkedFor::Undefined,
            marked_as_offline: false,
            favorite: None,
        }
    }

    /// Returns true for nodes whose children are listed during reconciliation
    pub fn is_container(&self) -> bool {
        matches!(
            self.node_type,
            NodeType::Folder | NodeType::FolderLink | NodeType::Site
        )
    }

    /// Returns true if the node has not been created remotely yet
    pub fn is_local_only(&self) -> bool {
        self.guid == LOCAL_ONLY_GUID
    }

    /// Drops capability placeholders the client could not interpret
    pub fn strip_unknown_operations(&mut self) {
        self.allowable_operations
            .retain(|op| *op != AllowableOperation::Unknown);
    }

    /// Merges a fresher snapshot of the same node into this record
    ///
    /// Remote-owned fields are replaced wholesale. `local_id` and
    /// `marked_as_offline` are local-only and never taken from `other`;
    /// `favorite` is only replaced when the snapshot carries a value.
    pub fn update_with(&mut self, other: &ListNode) {
        self.guid = other.guid.clone();
        self.parent_guid = other.parent_guid.clone();
        self.title = other.title.clone();
        self.mime_type = other.mime_type.clone();
        self.node_type = other.node_type;
        self.modified_at = other.modified_at;
        self.path = other.path.clone();
        self.allowable_operations = other.allowable_operations.clone();
        self.sync_status = other.sync_status;
        self.marked_for = other.marked_for;
        if other.favorite.is_some() {
            self.favorite = other.favorite;
        }
    }
}

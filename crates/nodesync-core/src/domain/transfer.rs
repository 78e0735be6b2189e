//! UploadTransfer domain entity
//!
//! An `UploadTransfer` is one queued local-to-remote file creation. It is
//! identified by its `local_filename_path` within an account, so storing the
//! same transfer twice always updates a single record.

use serde::{Deserialize, Serialize};

use super::node::{ListNode, MarkedFor, SyncStatus, LOCAL_ONLY_GUID};

/// Pending upload of a local file into a remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTransfer {
    pub local_id: Option<i64>,
    /// Remote guid of the destination folder (or task for attachments)
    pub parent_node_id: String,
    pub node_name: String,
    pub extension_type: String,
    pub mimetype: String,
    pub node_description: Option<String>,
    /// Path relative to the account's upload sandbox
    pub local_filename_path: String,
    pub sync_status: SyncStatus,
    /// Task attachments and general uploads share storage but are queried apart
    pub is_task_attachment: bool,
}

impl UploadTransfer {
    /// Creates a pending general-content upload
    pub fn new(
        parent_node_id: impl Into<String>,
        node_name: impl Into<String>,
        extension_type: impl Into<String>,
        mimetype: impl Into<String>,
        local_filename_path: impl Into<String>,
    ) -> Self {
        Self {
            local_id: None,
            parent_node_id: parent_node_id.into(),
            node_name: node_name.into(),
            extension_type: extension_type.into(),
            mimetype: mimetype.into(),
            node_description: None,
            local_filename_path: local_filename_path.into(),
            sync_status: SyncStatus::Pending,
            is_task_attachment: false,
        }
    }

    /// File name the remote node is created with
    pub fn file_name(&self) -> String {
        if self.extension_type.is_empty() {
            self.node_name.clone()
        } else {
            format!("{}.{}", self.node_name, self.extension_type)
        }
    }

    /// Projects the transfer into a placeholder node for listings
    pub fn list_node(&self) -> ListNode {
        let mut node = ListNode::file(LOCAL_ONLY_GUID, self.parent_node_id.clone(), self.file_name());
        node.mime_type = Some(self.mimetype.clone());
        node.sync_status = self.sync_status;
        node.marked_for = MarkedFor::Upload;
        node
    }
}

//! Remote node gateway port (driven/secondary port)
//!
//! Thin interface over the remote content repository. Unlike the other
//! ports, errors are typed: the sync engine classifies every failure into
//! authoritative absence, transient failure or cancellation, and persists
//! the outcome as node state rather than propagating it.
//!
//! ## Contract
//!
//! - Listings are paginated with `skip_count`/`max_items`; the page reports
//!   `total_items` and `has_more_items`.
//! - Downloads always overwrite the destination. A cancelled download or a
//!   dropped connection resolves to `Ok(None)`, never an error.
//! - Rendition lookup that exhausts its retries resolves to `Ok(None)`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::ListNode;

// ============================================================================
// T050: RemoteError
// ============================================================================

/// Errors returned by the remote gateway
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials rejected (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Node is not accessible to the current user (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Node does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit still exceeded after the transport gave up retrying
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// Any other non-success HTTP status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Request could not be sent or the response body could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Peer closed the connection before the exchange completed
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation was cancelled by its token
    #[error("Cancelled")]
    Cancelled,

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local disk failure while writing a download
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed URL built from local input
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Session provider could not produce credentials
    #[error("Session unavailable: {0}")]
    Session(String),
}

/// How the sync engine reacts to a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The node is gone or inaccessible; mark it for removal
    AuthoritativeAbsence,
    /// Might succeed later; mark the node as errored
    Transient,
    /// Not a failure; leave state untouched
    Cancelled,
}

impl RemoteError {
    /// Builds the error matching an HTTP status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => RemoteError::Unauthorized(message),
            403 => RemoteError::Forbidden(message),
            404 => RemoteError::NotFound(message),
            _ => RemoteError::Api { status, message },
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Unauthorized(_) => Some(401),
            RemoteError::Forbidden(_) => Some(403),
            RemoteError::NotFound(_) => Some(404),
            RemoteError::TooManyRequests { .. } => Some(429),
            RemoteError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn classify(&self) -> ErrorClass {
        match self {
            RemoteError::NotFound(_) | RemoteError::Forbidden(_) => ErrorClass::AuthoritativeAbsence,
            RemoteError::Cancelled | RemoteError::ConnectionLost => ErrorClass::Cancelled,
            _ => ErrorClass::Transient,
        }
    }
}

// ============================================================================
// T051: Gateway DTOs
// ============================================================================

/// One page of a folder listing
#[derive(Debug, Clone, Default)]
pub struct NodePage {
    pub nodes: Vec<ListNode>,
    pub skip_count: u32,
    pub max_items: u32,
    pub total_items: Option<u32>,
    pub has_more_items: bool,
}

impl NodePage {
    /// Skip count of the follow-up page, if one must be requested
    ///
    /// A full page always gets a follow-up; a short page only does when the
    /// server says more items exist or the reported total has not been
    /// reached. An empty page ends pagination.
    pub fn next_skip_count(&self) -> Option<u32> {
        let count = self.nodes.len() as u32;
        if count == 0 {
            return None;
        }
        let next = self.skip_count + count;
        let below_total = self.total_items.map(|total| next < total).unwrap_or(false);
        if count >= self.max_items || self.has_more_items || below_total {
            Some(next)
        } else {
            None
        }
    }
}

/// Content and metadata for a node to be created remotely
#[derive(Debug, Clone)]
pub struct NewNode {
    pub parent_guid: String,
    pub name: String,
    pub description: Option<String>,
    pub mimetype: String,
    pub content: Vec<u8>,
    /// Let the server resolve name collisions
    pub auto_rename: bool,
}

// ============================================================================
// T052: IRemoteGateway trait
// ============================================================================

#[async_trait::async_trait]
pub trait IRemoteGateway: Send + Sync {
    /// Lists one page of a folder's children
    ///
    /// # Arguments
    /// * `parent_guid` - Folder to list
    /// * `skip_count` - Number of children to skip
    /// * `max_items` - Page size
    async fn list_children(
        &self,
        parent_guid: &str,
        skip_count: u32,
        max_items: u32,
    ) -> Result<NodePage, RemoteError>;

    /// Fetches a single node's metadata
    async fn node_detail(&self, guid: &str) -> Result<ListNode, RemoteError>;

    /// Resolves the content URL of the node's preferred rendition
    ///
    /// Requests the rendition and polls for it when it does not exist yet.
    ///
    /// # Returns
    /// `None` when no rendition became available
    async fn rendition_url(&self, guid: &str) -> Result<Option<String>, RemoteError>;

    /// Downloads a node's content to `destination`
    ///
    /// # Returns
    /// The written path, or `None` if cancelled or the connection dropped
    async fn download_content(
        &self,
        guid: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError>;

    /// Downloads an arbitrary URL to `destination`
    ///
    /// # Returns
    /// The written path, or `None` if cancelled or the connection dropped
    async fn download_url(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError>;

    /// Creates a node with content (multipart upload)
    async fn create_node(&self, node: NewNode) -> Result<ListNode, RemoteError>;
}

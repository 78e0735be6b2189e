//! Domain entities and business logic
//!
//! This module contains the core domain types for NodeSync:
//! - Content nodes (files, folders) as cached from the remote repository
//! - Pending upload transfers
//! - Content path derivation
//! - MIME classification for renditions
//! - Domain-specific error types

pub mod errors;
pub mod mime;
pub mod node;
pub mod paths;
pub mod transfer;

// Re-export commonly used types
pub use errors::DomainError;
pub use mime::needs_rendition;
pub use node::{AllowableOperation, ListNode, MarkedFor, NodeType, SyncStatus, LOCAL_ONLY_GUID};
pub use paths::ContentPaths;
pub use transfer::UploadTransfer;

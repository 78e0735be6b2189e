//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly failures to parse persisted enum values back into domain types.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown sync status string
    #[error("Invalid sync status: {0}")]
    InvalidSyncStatus(String),

    /// Unknown marked-for string
    #[error("Invalid marked-for value: {0}")]
    InvalidMarkedFor(String),

    /// Unknown node type string
    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    /// A relative path escaped its sandbox or was otherwise malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

//! NodeSync Cache - Local persistence for the sync engine
//!
//! SQLite-based storage for:
//! - Cached content nodes and their sync state
//! - Pending upload transfers
//!
//! ## Architecture
//!
//! This crate implements the `INodeStore` and `ITransferStore` ports from
//! `nodesync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteNodeStore`] - `INodeStore` implementation, scoped to one account
//! - [`SqliteTransferStore`] - `ITransferStore` implementation with live subscriptions
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use nodesync_cache::{DatabasePool, SqliteNodeStore, SqliteTransferStore};
//! use nodesync_core::domain::ContentPaths;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/nodesync/nodesync.db")).await?;
//! let paths = ContentPaths::new("/home/user/.cache/nodesync/content", "/home/user/.local/share/nodesync/uploads");
//! let nodes = SqliteNodeStore::new(pool.pool().clone(), "alice", paths);
//! let transfers = SqliteTransferStore::new(pool.pool().clone(), "alice");
//! # Ok(())
//! # }
//! ```

pub mod node_store;
pub mod pool;
pub mod transfer_store;

pub use node_store::SqliteNodeStore;
pub use pool::DatabasePool;
pub use transfer_store::SqliteTransferStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<nodesync_core::domain::DomainError> for CacheError {
    fn from(e: nodesync_core::domain::DomainError) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

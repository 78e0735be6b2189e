//! Local content port (driven/secondary port)
//!
//! Disk operations the sync engine performs on cached content and queued
//! uploads. Uses `anyhow::Result` because filesystem errors are
//! adapter-specific.

use std::path::Path;

#[async_trait::async_trait]
pub trait ILocalContent: Send + Sync {
    /// Creates a directory and any missing parents
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()>;

    /// Deletes a file or directory tree
    ///
    /// A missing path is not an error.
    async fn delete_path(&self, path: &Path) -> anyhow::Result<()>;

    /// Returns true if something exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Reads the entire contents of a file
    async fn read_bytes(&self, path: &Path) -> anyhow::Result<Vec<u8>>;
}

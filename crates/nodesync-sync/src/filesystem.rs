//! Local content adapter (secondary/driven adapter)
//!
//! Implements [`ILocalContent`] using `tokio::fs`. Downloads themselves are
//! written by the remote gateway; this adapter covers the directory
//! preparation, cleanup and upload reads the sync engine does around them.

use std::io::ErrorKind;
use std::path::Path;

use nodesync_core::ports::ILocalContent;
use tracing::{debug, instrument};

// ============================================================================
// T080: LocalContentAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalContent`] port to the real filesystem.
///
/// Zero-sized: every operation takes the full path it works on, roots are
/// resolved by [`ContentPaths`](nodesync_core::domain::ContentPaths).
#[derive(Debug, Clone, Default)]
pub struct LocalContentAdapter;

impl LocalContentAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

// ============================================================================
// T081-T084: ILocalContent implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalContent for LocalContentAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete_path(&self, path: &Path) -> anyhow::Result<()> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            debug!("removing directory recursively");
            tokio::fs::remove_dir_all(path).await?;
        } else {
            debug!("removing file");
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read_bytes(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let data = tokio::fs::read(path).await?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }
}

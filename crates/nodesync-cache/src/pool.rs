//! SQLite pool shared by the node and transfer stores
//!
//! Both stores write from many sync operations at once, so file databases
//! run in WAL mode with `synchronous = NORMAL` and a busy timeout long enough
//! to ride out a concurrent writer. The schema is applied through sqlx's
//! versioned migrator; the migration files live in `migrations/` at the
//! crate root, one per table.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

/// Versioned schema for `list_nodes` and `upload_transfers`
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Upper bound on connections for file databases
///
/// SQLite admits one writer at a time; extra connections only help readers
/// such as transfer subscriptions running beside a pass.
const MAX_FILE_CONNECTIONS: u32 = 4;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a caller waits for a free connection
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the migrated cache database
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the database file at `db_path` and migrates it
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` when the parent directory or the file
    /// cannot be opened; `CacheError::MigrationFailed` when the schema cannot
    /// be brought up to date, including when the file was written by a newer
    /// build with migrations this one does not know.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!("{}: {}", parent.display(), e))
            })?;
        }

        let options = writer_options(SqliteConnectOptions::new().filename(db_path))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_FILE_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("{}: {}", db_path.display(), e)))?;

        let db = Self { pool };
        db.migrate().await?;
        info!(path = %db_path.display(), "Cache database ready");
        Ok(db)
    }

    /// Private in-memory database, used by tests
    ///
    /// The database lives inside its only connection, so that connection is
    /// never reaped for idleness or age.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(writer_options(options))
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory database: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies every migration the database has not seen yet
    async fn migrate(&self) -> Result<(), CacheError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(e.to_string()))?;
        debug!(known = MIGRATOR.iter().count(), "Schema migrations applied");
        Ok(())
    }
}

/// Settings shared by every connection that may write
fn writer_options(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
}

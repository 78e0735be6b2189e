//! Configuration module for NodeSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// T090: Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for NodeSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    pub sync: SyncConfig,
    pub renditions: RenditionsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Remote account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Account identifier, used to namespace cached content on disk.
    pub id: String,
    /// Root URL of the remote repository REST API.
    pub base_url: String,
    /// Static bearer token. `None` when credentials come from elsewhere.
    pub access_token: Option<String>,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Children requested per listing page.
    pub page_size: u32,
    /// Maximum number of sync operations running at once.
    pub max_concurrent_operations: usize,
    /// Seconds between background sync passes.
    pub poll_interval: u64,
}

/// Rendition polling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenditionBackoff {
    /// Wait the same interval between every poll.
    #[default]
    Fixed,
    /// Double the interval after every poll.
    Exponential,
}

/// Rendition creation and polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenditionsConfig {
    /// Milliseconds between rendition status polls.
    pub poll_interval_ms: u64,
    /// Polls before giving up on a rendition.
    pub max_retries: u32,
    pub backoff: RenditionBackoff,
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding nodes and transfers.
    pub database: PathBuf,
    /// Root for downloaded content and renditions.
    pub content_dir: PathBuf,
    /// Root of the per-account upload sandboxes.
    pub upload_dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// T091: Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/nodesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("nodesync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// T092: Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("nodesync")
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            base_url: "http://localhost:8080/alfresco/api/-default-/public/alfresco/versions/1"
                .to_string(),
            access_token: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_concurrent_operations: 4,
            poll_interval: 300,
        }
    }
}

impl Default for RenditionsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_retries: 3,
            backoff: RenditionBackoff::Fixed,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("~/.cache"))
            .join("nodesync");
        Self {
            database: data_dir.join("nodesync.db"),
            content_dir: cache_dir.join("content"),
            upload_dir: data_dir.join("uploads"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// T093: Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn must_be_positive(field: &str) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: "must be greater than 0".into(),
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- account ---
        if self.account.id.trim().is_empty() {
            errors.push(ValidationError {
                field: "account.id".into(),
                message: "must not be empty".into(),
            });
        } else if self.account.id.contains(['/', '\\']) || self.account.id.contains("..") {
            errors.push(ValidationError {
                field: "account.id".into(),
                message: format!("must be a single path component: {}", self.account.id),
            });
        }
        if !(self.account.base_url.starts_with("http://")
            || self.account.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "account.base_url".into(),
                message: format!("must be an http(s) URL: {}", self.account.base_url),
            });
        }

        // --- sync ---
        if self.sync.page_size == 0 {
            errors.push(must_be_positive("sync.page_size"));
        }
        if self.sync.max_concurrent_operations == 0 {
            errors.push(must_be_positive("sync.max_concurrent_operations"));
        }
        if self.sync.poll_interval == 0 {
            errors.push(must_be_positive("sync.poll_interval"));
        }

        // --- renditions ---
        if self.renditions.poll_interval_ms == 0 {
            errors.push(must_be_positive("renditions.poll_interval_ms"));
        }
        if self.renditions.max_retries == 0 {
            errors.push(must_be_positive("renditions.max_retries"));
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid log level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// T094: ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and lets callers override individual fields.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- account ---

    pub fn account_id(mut self, id: impl Into<String>) -> Self {
        self.config.account.id = id.into();
        self
    }

    pub fn account_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.account.base_url = url.into();
        self
    }

    pub fn account_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.account.access_token = Some(token.into());
        self
    }

    // --- sync ---

    pub fn sync_page_size(mut self, n: u32) -> Self {
        self.config.sync.page_size = n;
        self
    }

    pub fn sync_max_concurrent_operations(mut self, n: usize) -> Self {
        self.config.sync.max_concurrent_operations = n;
        self
    }

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    // --- renditions ---

    pub fn renditions_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.renditions.poll_interval_ms = ms;
        self
    }

    pub fn renditions_max_retries(mut self, n: u32) -> Self {
        self.config.renditions.max_retries = n;
        self
    }

    pub fn renditions_backoff(mut self, backoff: RenditionBackoff) -> Self {
        self.config.renditions.backoff = backoff;
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    pub fn storage_content_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.content_dir = path;
        self
    }

    pub fn storage_upload_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.upload_dir = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// T095: Unit tests
// ---------------------------------------------------------------------------

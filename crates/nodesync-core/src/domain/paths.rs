//! Content path derivation
//!
//! Downloaded content, renditions and queued uploads live under per-account
//! roots. Locations are never persisted; they are derived on demand from the
//! account identifier, node guid and title.

use std::path::{Component, Path, PathBuf};

use super::errors::DomainError;

/// Directory name holding a node's rendition, next to its content
const RENDITION_DIR: &str = "rendition";

/// Used when a segment reduces to nothing usable
const FALLBACK_COMPONENT: &str = "_";

/// Reduces remote-supplied text to one plain path component
///
/// Separators become `_`; empty, `.` and `..` results (and anything that
/// still does not parse as a single normal component, such as a Windows
/// drive prefix) yield `fallback`.
fn single_component(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    let mut components = Path::new(&cleaned).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => cleaned,
        _ => fallback.to_string(),
    }
}

/// Roots for cached content and the upload sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPaths {
    content_root: PathBuf,
    upload_root: PathBuf,
}

impl ContentPaths {
    pub fn new(content_root: impl Into<PathBuf>, upload_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            upload_root: upload_root.into(),
        }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Per-node directory under the content root
    fn node_dir(&self, account_id: &str, guid: &str) -> PathBuf {
        self.content_root
            .join(single_component(account_id, FALLBACK_COMPONENT))
            .join(single_component(guid, FALLBACK_COMPONENT))
    }

    /// Location of a node's downloaded content
    ///
    /// `<content_root>/<account>/<guid>/<title>`
    ///
    /// Every segment comes from remote metadata and is reduced to a single
    /// file name, so the result always stays below the content root. A title
    /// with nothing usable left falls back to the guid.
    pub fn file_local_path(&self, account_id: &str, guid: &str, title: &str) -> PathBuf {
        self.node_dir(account_id, guid)
            .join(single_component(title, &single_component(guid, FALLBACK_COMPONENT)))
    }

    /// Location of a node's downloaded rendition
    ///
    /// `<content_root>/<account>/<guid>/rendition/<title>`
    pub fn rendition_local_path(&self, account_id: &str, guid: &str, title: &str) -> PathBuf {
        self.node_dir(account_id, guid)
            .join(RENDITION_DIR)
            .join(single_component(title, &single_component(guid, FALLBACK_COMPONENT)))
    }

    /// Resolves a transfer's sandbox-relative path to an absolute location
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPath` if `relative` is absolute or
    /// climbs out of the account sandbox.
    pub fn upload_local_path(&self, account_id: &str, relative: &str) -> Result<PathBuf, DomainError> {
        let relative_path = Path::new(relative);
        let escapes = relative_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(DomainError::InvalidPath(relative.to_string()));
        }
        Ok(self.upload_root.join(account_id).join(relative_path))
    }
}

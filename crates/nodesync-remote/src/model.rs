//! Repository response types
//!
//! JSON shapes returned by the REST API and their mapping to domain
//! [`ListNode`]s. Listings wrap every item in an `entry` object and carry a
//! `pagination` block:
//!
//! ```json
//! { "list": {
//!     "pagination": { "count": 2, "hasMoreItems": false, "totalItems": 2,
//!                     "skipCount": 0, "maxItems": 100 },
//!     "entries": [ { "entry": { "id": "…", "name": "…", "nodeType": "cm:content", … } } ]
//! } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use nodesync_core::domain::{AllowableOperation, ListNode, NodeType};
use nodesync_core::ports::NodePage;

/// Repository type of folder links
const FOLDER_LINK_TYPE: &str = "app:folderlink";

/// Repository type of collaboration sites
const SITE_TYPE: &str = "st:site";

/// Accepts both `+00:00` and the repository's `+0000` offset style
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .or_else(|_| DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    })
    .transpose()
}

/// Single-item envelope
#[derive(Debug, Deserialize)]
pub struct Entry<T> {
    pub entry: T,
}

/// Paged list envelope
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub list: List<T>,
}

#[derive(Debug, Deserialize)]
pub struct List<T> {
    pub pagination: Option<Pagination>,
    #[serde(default = "Vec::new")]
    pub entries: Vec<Entry<T>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub count: u32,
    #[serde(default)]
    pub has_more_items: bool,
    pub total_items: Option<u32>,
    #[serde(default)]
    pub skip_count: u32,
    pub max_items: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathInfo {
    pub name: Option<String>,
}

/// Node as returned by listing and detail endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub modified_at: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub content: Option<ContentInfo>,
    pub path: Option<PathInfo>,
    #[serde(default)]
    pub allowable_operations: Vec<AllowableOperation>,
    pub is_favorite: Option<bool>,
}

impl NodeEntry {
    fn domain_type(&self) -> NodeType {
        match self.node_type.as_str() {
            FOLDER_LINK_TYPE => NodeType::FolderLink,
            SITE_TYPE => NodeType::Site,
            _ if self.is_folder => NodeType::Folder,
            _ => NodeType::File,
        }
    }

    /// Converts to a domain node with default sync state
    ///
    /// `fallback_parent` is used when the response omits `parentId`.
    pub fn into_list_node(self, fallback_parent: &str) -> ListNode {
        let node_type = self.domain_type();
        let mut node = ListNode::file(
            self.id,
            self.parent_id.unwrap_or_else(|| fallback_parent.to_string()),
            self.name,
        );
        node.node_type = node_type;
        node.mime_type = self.content.and_then(|c| c.mime_type);
        node.modified_at = self.modified_at;
        node.path = self.path.and_then(|p| p.name).unwrap_or_default();
        node.allowable_operations = self.allowable_operations;
        node.favorite = self.is_favorite;
        node.strip_unknown_operations();
        node
    }
}

impl ListResponse<NodeEntry> {
    /// Converts a children listing into a page of domain nodes
    pub fn into_page(self, parent_guid: &str, skip_count: u32, max_items: u32) -> NodePage {
        let pagination = self.list.pagination;
        let nodes: Vec<ListNode> = self
            .list
            .entries
            .into_iter()
            .map(|e| e.entry.into_list_node(parent_guid))
            .collect();

        match pagination {
            Some(p) => NodePage {
                nodes,
                skip_count: p.skip_count,
                max_items: p.max_items,
                total_items: p.total_items,
                has_more_items: p.has_more_items,
            },
            None => NodePage {
                nodes,
                skip_count,
                max_items,
                total_items: None,
                has_more_items: false,
            },
        }
    }
}

/// Rendition as returned by the renditions endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct RenditionEntry {
    pub id: String,
    pub status: RenditionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenditionStatus {
    Created,
    NotCreated,
    #[serde(other)]
    Unknown,
}

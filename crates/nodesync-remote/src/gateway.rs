//! RemoteNodeGateway - IRemoteGateway over the repository REST API
//!
//! This adapter translates between the repository's JSON entities and
//! nodesync-core domain nodes, and routes every call through
//! [`RemoteClient`] so authorization and 429 handling apply uniformly.
//!
//! ## Endpoints
//!
//! | Operation          | Request                                             |
//! |--------------------|-----------------------------------------------------|
//! | `list_children`    | `GET nodes/{id}/children?skipCount&maxItems&include` |
//! | `node_detail`      | `GET nodes/{id}?include`                            |
//! | `rendition_url`    | `GET/POST nodes/{id}/renditions`, poll `…/{rid}`    |
//! | `download_content` | `GET nodes/{id}/content`                            |
//! | `download_url`     | `GET <absolute url>`                                |
//! | `create_node`      | `POST nodes/{id}/children?autoRename` (multipart)   |

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use nodesync_core::domain::ListNode;
use nodesync_core::ports::{IRemoteGateway, NewNode, NodePage, RemoteError};

use crate::client::{transport_error, RemoteClient};
use crate::download::{send_cancellable, stream_to_file};
use crate::model::{Entry, ListResponse, NodeEntry};
use crate::rendition::{self, RenditionPolicy};

/// Extra node fields requested on every listing and detail call
const NODE_INCLUDE: &str = "allowableOperations,path,isFavorite";

/// Repository content type given to uploaded nodes
const CONTENT_NODE_TYPE: &str = "cm:content";

/// Remote gateway backed by the repository REST API
pub struct RemoteNodeGateway {
    client: RemoteClient,
    renditions: RenditionPolicy,
}

impl RemoteNodeGateway {
    pub fn new(client: RemoteClient, renditions: RenditionPolicy) -> Self {
        Self { client, renditions }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    async fn download_to(
        &self,
        label: &str,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError> {
        let request = self.client.send(label, |http| {
            http.get(url).query(&[("attachment", "false")])
        });
        let response = match send_cancellable(request, cancel).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                debug!(label, "Download cancelled before response");
                return Ok(None);
            }
            Err(RemoteError::ConnectionLost) => {
                debug!(label, "Connection lost before response");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        stream_to_file(response, destination, cancel).await
    }
}

fn multipart_form(node: &NewNode) -> Form {
    let file_part = || Part::bytes(node.content.clone()).file_name(node.name.clone());
    let filedata = file_part()
        .mime_str(&node.mimetype)
        .unwrap_or_else(|_| file_part());

    let mut form = Form::new()
        .part("filedata", filedata)
        .text("name", node.name.clone())
        .text("nodeType", CONTENT_NODE_TYPE);
    if let Some(description) = &node.description {
        form = form.text("cm:description", description.clone());
    }
    form
}

#[async_trait::async_trait]
impl IRemoteGateway for RemoteNodeGateway {
    async fn list_children(
        &self,
        parent_guid: &str,
        skip_count: u32,
        max_items: u32,
    ) -> Result<NodePage, RemoteError> {
        let path = format!("nodes/{}/children", parent_guid);
        let response: ListResponse<NodeEntry> = self
            .client
            .get_json(
                &path,
                &[
                    ("skipCount", skip_count.to_string()),
                    ("maxItems", max_items.to_string()),
                    ("include", NODE_INCLUDE.to_string()),
                ],
            )
            .await?;

        let page = response.into_page(parent_guid, skip_count, max_items);
        debug!(
            parent = %parent_guid,
            skip_count,
            count = page.nodes.len(),
            total = ?page.total_items,
            "Listed children"
        );
        Ok(page)
    }

    async fn node_detail(&self, guid: &str) -> Result<ListNode, RemoteError> {
        let path = format!("nodes/{}", guid);
        let response: Entry<NodeEntry> = self
            .client
            .get_json(&path, &[("include", NODE_INCLUDE.to_string())])
            .await?;
        Ok(response.entry.into_list_node(""))
    }

    async fn rendition_url(&self, guid: &str) -> Result<Option<String>, RemoteError> {
        rendition::resolve(&self.client, &self.renditions, guid).await
    }

    async fn download_content(
        &self,
        guid: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError> {
        let url = self.client.url(&format!("nodes/{}/content", guid));
        self.download_to(guid, &url, destination, cancel).await
    }

    async fn download_url(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, RemoteError> {
        let parsed = url::Url::parse(url).map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", url, e)))?;
        self.download_to(parsed.path(), parsed.as_str(), destination, cancel)
            .await
    }

    async fn create_node(&self, node: NewNode) -> Result<ListNode, RemoteError> {
        let path = format!("nodes/{}/children", node.parent_guid);
        let url = self.client.url(&path);
        let auto_rename = node.auto_rename.to_string();

        let response = self
            .client
            .send(&path, |http| {
                http.post(&url)
                    .query(&[("autoRename", auto_rename.as_str()), ("include", NODE_INCLUDE)])
                    .multipart(multipart_form(&node))
            })
            .await?;

        let created: Entry<NodeEntry> = response.json().await.map_err(transport_error)?;
        let created = created.entry.into_list_node(&node.parent_guid);
        info!(
            guid = %created.guid,
            parent = %node.parent_guid,
            name = %created.title,
            "Created remote node"
        );
        Ok(created)
    }
}

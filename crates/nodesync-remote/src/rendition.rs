//! Rendition lookup state machine
//!
//! ```text
//!   list renditions ──► preferred already CREATED ──► content URL
//!          │
//!          └─► request creation ──► poll ──► CREATED ──► content URL
//!                                     │
//!                                     └─ retries exhausted ──► None
//! ```
//!
//! PDF is preferred, the image preview is the fallback. Exhausting the poll
//! budget is not an error: callers fall back to a generic icon.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info};

use nodesync_core::config::{RenditionBackoff, RenditionsConfig};
use nodesync_core::ports::RemoteError;

use crate::client::RemoteClient;
use crate::model::{Entry, ListResponse, RenditionEntry, RenditionStatus};

/// Rendition ids in order of preference
pub const PREFERRED_RENDITIONS: [&str; 2] = ["pdf", "imgpreview"];

/// Longest single wait between polls under exponential backoff
const MAX_POLL_DELAY: Duration = Duration::from_secs(60);

/// How rendition creation is polled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionPolicy {
    pub interval: Duration,
    pub max_retries: u32,
    pub backoff: RenditionBackoff,
}

impl Default for RenditionPolicy {
    fn default() -> Self {
        Self::from_config(&RenditionsConfig::default())
    }
}

impl RenditionPolicy {
    pub fn from_config(config: &RenditionsConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_retries: config.max_retries,
            backoff: config.backoff,
        }
    }

    /// Wait before poll number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            RenditionBackoff::Fixed => self.interval,
            RenditionBackoff::Exponential => self
                .interval
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(MAX_POLL_DELAY),
        }
    }
}

fn renditions_path(guid: &str) -> String {
    format!("nodes/{}/renditions", guid)
}

fn content_url(client: &RemoteClient, guid: &str, rendition_id: &str) -> String {
    client.url(&format!("nodes/{}/renditions/{}/content", guid, rendition_id))
}

/// Resolves the content URL of a node's preferred rendition
///
/// # Returns
/// `None` if the node offers no preferred rendition or it was not created
/// within the policy's poll budget
pub async fn resolve(
    client: &RemoteClient,
    policy: &RenditionPolicy,
    guid: &str,
) -> Result<Option<String>, RemoteError> {
    let listing: ListResponse<RenditionEntry> =
        client.get_json(&renditions_path(guid), &[]).await?;
    let available: Vec<RenditionEntry> = listing.list.entries.into_iter().map(|e| e.entry).collect();

    for id in PREFERRED_RENDITIONS {
        if available
            .iter()
            .any(|r| r.id == id && r.status == RenditionStatus::Created)
        {
            debug!(guid, rendition = id, "Rendition already created");
            return Ok(Some(content_url(client, guid, id)));
        }
    }

    let Some(target) = PREFERRED_RENDITIONS
        .into_iter()
        .find(|id| available.iter().any(|r| r.id == *id))
    else {
        debug!(guid, "No preferred rendition offered");
        return Ok(None);
    };

    match client
        .post_json(&renditions_path(guid), &serde_json::json!({ "id": target }))
        .await
    {
        Ok(_) => {}
        // Creation already requested by someone else
        Err(RemoteError::Api { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {}
        Err(e) => return Err(e),
    }
    info!(guid, rendition = target, "Requested rendition creation");

    let poll_path = format!("{}/{}", renditions_path(guid), target);
    for attempt in 0..policy.max_retries {
        tokio::time::sleep(policy.delay(attempt)).await;
        let rendition: Entry<RenditionEntry> = client.get_json(&poll_path, &[]).await?;
        if rendition.entry.status == RenditionStatus::Created {
            debug!(guid, rendition = target, attempt, "Rendition created");
            return Ok(Some(content_url(client, guid, target)));
        }
    }

    info!(
        guid,
        rendition = target,
        retries = policy.max_retries,
        "Rendition not available after polling"
    );
    Ok(None)
}

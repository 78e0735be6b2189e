//! NodeSync Remote - Content repository gateway
//!
//! Implements the `IRemoteGateway` port from `nodesync-core` over the
//! repository's REST API:
//! - [`client`] - Authenticated HTTP client with 429 handling
//! - [`model`] - Response types and their mapping to domain nodes
//! - [`rendition`] - Rendition lookup, creation and polling
//! - [`download`] - Cancellable streaming downloads
//! - [`gateway`] - [`RemoteNodeGateway`], the port implementation
//! - [`session`] - Session provider implementations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nodesync_core::ports::IRemoteGateway;
//! use nodesync_remote::{RemoteClient, RemoteNodeGateway, RenditionPolicy, StaticTokenProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let session = Arc::new(StaticTokenProvider::new("token"));
//! let client = RemoteClient::new("https://ecm.example.com/api", session);
//! let gateway = RemoteNodeGateway::new(client, RenditionPolicy::default());
//! let page = gateway.list_children("-my-", 0, 100).await?;
//! println!("{} children", page.nodes.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod download;
pub mod gateway;
pub mod model;
pub mod rendition;
pub mod session;

pub use client::RemoteClient;
pub use gateway::RemoteNodeGateway;
pub use nodesync_core::ports::{ErrorClass, RemoteError};
pub use rendition::RenditionPolicy;
pub use session::StaticTokenProvider;

//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`INodeStore`] - Persistent cache of content nodes
//! - [`ITransferStore`] - Persistent queue of pending uploads with live subscriptions
//! - [`IRemoteGateway`] - Remote repository operations (listing, renditions, transfers)
//! - [`ISessionProvider`] - Authorization headers for the current account
//! - [`ILocalContent`] - Local disk operations on cached and queued content

pub mod local_content;
pub mod node_store;
pub mod remote_gateway;
pub mod session;
pub mod transfer_store;

pub use local_content::ILocalContent;
pub use node_store::{INodeStore, StatusCounts};
pub use remote_gateway::{ErrorClass, IRemoteGateway, NewNode, NodePage, RemoteError};
pub use session::{AuthorizationHeaders, ISessionProvider};
pub use transfer_store::{ITransferStore, SubscriptionHandle, TransferChangeHandler};

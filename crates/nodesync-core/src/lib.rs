//! NodeSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `ListNode`, `UploadTransfer`, sync status enums
//! - **Content paths** - pure derivation of on-disk locations for cached content
//! - **Port definitions** - Traits for adapters: `INodeStore`, `ITransferStore`,
//!   `IRemoteGateway`, `ISessionProvider`, `ILocalContent`
//! - **Configuration** - YAML-backed settings shared by every adapter
//!
//! # Architecture
//!
//! The domain module contains pure data and merge rules with no I/O.
//! Ports define trait interfaces that adapter crates implement; the sync
//! engine in `nodesync-sync` only ever talks to these traits.

pub mod config;
pub mod domain;
pub mod ports;

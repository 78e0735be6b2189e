//! Integration tests for nodesync-remote
//!
//! Uses wiremock to simulate the repository REST API and verifies
//! pagination, rendition polling, downloads and uploads end to end.

mod common;

mod test_children;
mod test_renditions;
mod test_transfers;

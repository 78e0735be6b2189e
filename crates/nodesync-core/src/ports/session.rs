//! Session provider port
//!
//! The sync core never handles credentials itself. Before every remote
//! operation it asks the session provider for the headers to attach; the
//! provider is responsible for refreshing tokens transparently.

use std::collections::BTreeMap;

/// Header name/value pairs authorizing a remote request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationHeaders {
    headers: BTreeMap<String, String>,
}

impl AuthorizationHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers carrying a bearer token
    pub fn bearer(token: &str) -> Self {
        let mut headers = Self::new();
        headers.insert("Authorization", format!("Bearer {}", token));
        headers
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[async_trait::async_trait]
pub trait ISessionProvider: Send + Sync {
    /// Returns valid authorization headers for the current account
    ///
    /// # Errors
    /// Returns an error if no valid session can be obtained
    async fn authorization(&self) -> anyhow::Result<AuthorizationHeaders>;
}

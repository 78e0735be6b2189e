//! Session provider implementations

use nodesync_core::ports::{AuthorizationHeaders, ISessionProvider};

/// Session provider backed by a fixed bearer token
///
/// Suitable for service accounts and tests; it never refreshes.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl ISessionProvider for StaticTokenProvider {
    async fn authorization(&self) -> anyhow::Result<AuthorizationHeaders> {
        if self.token.is_empty() {
            anyhow::bail!("No access token configured");
        }
        Ok(AuthorizationHeaders::bearer(&self.token))
    }
}

//! Health API.

use crate::client::SoukClient;
use crate::error::Result;
use crate::types::HealthResponse;

/// Health API client.
///
/// Note: Health endpoints typically don't require authentication.
pub struct HealthApi {
    client: SoukClient,
}

impl HealthApi {
    pub(crate) fn new(client: SoukClient) -> Self {
        Self { client }
    }

    /// Check basic health.
    pub async fn check(&self) -> Result<HealthResponse> {
        self.client.get("health").await
    }

    /// Simple connectivity check - returns true if server is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.check().await.is_ok()
    }
}

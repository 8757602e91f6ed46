//! Users API.

use crate::client::SoukClient;
use crate::error::Result;
use crate::types::UserResponse;

/// Users API client.
pub struct UsersApi {
    client: SoukClient,
}

impl UsersApi {
    pub(crate) fn new(client: SoukClient) -> Self {
        Self { client }
    }

    /// Get a user by ID.
    pub async fn get(&self, id: &str) -> Result<UserResponse> {
        self.client.get(&format!("users/{}", id)).await
    }
}

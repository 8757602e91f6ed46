//! Messages API.

use crate::client::SoukClient;
use crate::error::{Error, Result};
use crate::types::{SendMessageRequest, SendMessageResponse};

/// Messages API client.
pub struct MessagesApi {
    client: SoukClient,
}

impl MessagesApi {
    pub(crate) fn new(client: SoukClient) -> Self {
        Self { client }
    }

    /// Send a message to a user.
    ///
    /// The server creates the conversation if the two users share none.
    pub async fn send(&self, request: SendMessageRequest) -> Result<SendMessageResponse> {
        if request.content.trim().is_empty() {
            return Err(Error::InvalidRequest("message content is empty".to_string()));
        }
        self.client.post("messages", &request).await
    }
}

//! Conversations API.

use crate::client::SoukClient;
use crate::error::Result;
use crate::types::{ListConversationsResponse, ListMessagesResponse};

/// Conversations API client.
pub struct ConversationsApi {
    client: SoukClient,
}

impl ConversationsApi {
    pub(crate) fn new(client: SoukClient) -> Self {
        Self { client }
    }

    /// List the authenticated user's conversations.
    pub async fn list(&self) -> Result<ListConversationsResponse> {
        self.client.get("conversations").await
    }

    /// List the messages of a conversation.
    pub async fn messages(&self, conversation_id: &str) -> Result<ListMessagesResponse> {
        self.client
            .get(&format!("conversations/{}/messages", conversation_id))
            .await
    }

    /// Mark every message in a conversation as read.
    pub async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        self.client
            .post_no_content(&format!("conversations/{}/read", conversation_id))
            .await
    }
}

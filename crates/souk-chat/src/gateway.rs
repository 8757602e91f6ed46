//! Remote data gateway seam.
//!
//! Everything the chat core reads or writes remotely goes through
//! [`ChatGateway`], so sessions can run against the HTTP SDK or an
//! in-process fake.

use crate::error::Result;
use async_trait::async_trait;
use souk_client::{Conversation, Message, SendMessageRequest, SoukClient, UserRef};

/// Pull-based access to conversations, messages and users.
#[async_trait]
pub trait ChatGateway: Send + Sync + 'static {
    /// Conversations of the authenticated user, with unread counts.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Messages of one conversation, in any order.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Send a message addressed to a user.
    ///
    /// The server stores it in the conversation between the two users,
    /// creating that conversation when none exists.
    async fn send_message(&self, request: SendMessageRequest) -> Result<Message>;

    /// Look up a user's profile.
    async fn get_user(&self, user_id: &str) -> Result<UserRef>;

    /// Mark every message in a conversation as read.
    async fn mark_read(&self, conversation_id: &str) -> Result<()>;
}

#[async_trait]
impl ChatGateway for SoukClient {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        Ok(self.conversations().list().await?.conversations)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self.conversations().messages(conversation_id).await?.messages)
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message> {
        Ok(self.messages().send(request).await?.message)
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRef> {
        Ok(self.users().get(user_id).await?.user)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        Ok(self.conversations().mark_read(conversation_id).await?)
    }
}

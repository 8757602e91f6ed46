//! Outbound message composition.
//!
//! The composer holds the draft text and an optional product snapshot, and
//! knows the two ways a message leaves the client: into a conversation that
//! already exists, or addressed to a user the client has no conversation
//! with yet. The draft and product survive a failed send and are cleared by
//! a successful one, so a product is attached to at most one message.

use crate::error::{ChatError, Result};
use crate::gateway::ChatGateway;
use crate::query::{ChatCache, ChatQuery};
use crate::resolver::counterpart_of;
use souk_client::{Conversation, Message, ProductContext, SendMessageRequest};
use std::sync::Arc;

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Sent into the conversation that was already open.
    Delivered {
        conversation_id: String,
        message: Message,
    },
    /// Sent to a user; their conversation was found in the refreshed list.
    Created {
        conversation: Conversation,
        message: Message,
    },
    /// The server accepted the message but the refreshed list does not
    /// show its conversation yet.
    Unlocated { user_id: String, message: Message },
}

impl SendOutcome {
    /// The stored message.
    pub fn message(&self) -> &Message {
        match self {
            SendOutcome::Delivered { message, .. }
            | SendOutcome::Created { message, .. }
            | SendOutcome::Unlocated { message, .. } => message,
        }
    }

    /// The conversation the message landed in, when known locally.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            SendOutcome::Delivered {
                conversation_id, ..
            } => Some(conversation_id),
            SendOutcome::Created { conversation, .. } => Some(&conversation.id),
            SendOutcome::Unlocated { .. } => None,
        }
    }
}

/// Draft state plus the send operations.
pub struct Composer<G: ChatGateway> {
    owner: String,
    gateway: Arc<G>,
    cache: ChatCache<G>,
    draft: String,
    product: Option<ProductContext>,
}

impl<G: ChatGateway> Composer<G> {
    /// Create an empty composer sending as `owner`.
    pub fn new(owner: impl Into<String>, gateway: Arc<G>, cache: ChatCache<G>) -> Self {
        Self {
            owner: owner.into(),
            gateway,
            cache,
            draft: String::new(),
            product: None,
        }
    }

    /// Current draft text.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the draft text.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Attach a product to the next message.
    pub fn attach_product(&mut self, product: ProductContext) {
        self.product = (!product.is_empty()).then_some(product);
    }

    /// Remove the attached product.
    pub fn detach_product(&mut self) -> Option<ProductContext> {
        self.product.take()
    }

    /// Product that the next message will carry.
    pub fn pending_product(&self) -> Option<&ProductContext> {
        self.product.as_ref()
    }

    /// Send `content` into an existing conversation.
    ///
    /// The recipient is the conversation's other party, looked up in the
    /// cached list (fetched if absent). On success the thread and the list
    /// are invalidated so they refetch.
    pub async fn send_into_existing(
        &mut self,
        conversation_id: &str,
        content: &str,
    ) -> Result<SendOutcome> {
        self.draft = content.to_string();
        let content = validate(content)?;

        let receiver = self.receiver_for(conversation_id).await?;
        let message = self.dispatch(&receiver, content).await?;

        self.cache.invalidate(&ChatQuery::messages(conversation_id));
        self.cache.invalidate(&ChatQuery::Conversations);

        Ok(SendOutcome::Delivered {
            conversation_id: conversation_id.to_string(),
            message,
        })
    }

    /// Send `content` to a user the client has no conversation with.
    ///
    /// The server creates the conversation. The list is then refetched and
    /// searched for it, preferring the id on the stored message and falling
    /// back to any conversation that includes the user.
    pub async fn send_to_new_target(&mut self, user_id: &str, content: &str) -> Result<SendOutcome> {
        self.draft = content.to_string();
        let content = validate(content)?;

        let message = self.dispatch(user_id, content).await?;

        let list = match self.cache.fetch(&ChatQuery::Conversations).await {
            Ok(data) => data.conversations(),
            Err(e) => {
                tracing::warn!(error = %e, "Conversation list refetch failed after send");
                None
            }
        };

        let conversation = list.as_ref().and_then(|list| {
            list.iter()
                .find(|c| c.id == message.conversation_id)
                .or_else(|| list.iter().find(|c| c.has_participant(user_id)))
                .cloned()
        });

        Ok(match conversation {
            Some(conversation) => {
                tracing::info!(conversation = %conversation.id, user = %user_id, "Conversation started");
                SendOutcome::Created {
                    conversation,
                    message,
                }
            }
            None => SendOutcome::Unlocated {
                user_id: user_id.to_string(),
                message,
            },
        })
    }

    async fn receiver_for(&self, conversation_id: &str) -> Result<String> {
        let find = |list: &[Conversation]| {
            list.iter()
                .find(|c| c.id == conversation_id)
                .and_then(|c| counterpart_of(c, &self.owner))
                .map(|user| user.id.clone())
        };

        if let Some(receiver) = self
            .cache
            .value(&ChatQuery::Conversations)
            .and_then(|data| data.conversations())
            .and_then(|list| find(list.as_slice()))
        {
            return Ok(receiver);
        }

        let data = self.cache.fetch(&ChatQuery::Conversations).await?;
        data.conversations()
            .and_then(|list| find(list.as_slice()))
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))
    }

    async fn dispatch(&mut self, receiver_id: &str, content: &str) -> Result<Message> {
        let mut request = SendMessageRequest::new(receiver_id, content);
        if let Some(product) = &self.product {
            request = request.with_product(product.clone());
        }

        match self.gateway.send_message(request).await {
            Ok(message) => {
                tracing::debug!(message = %message.id, conversation = %message.conversation_id, "Message sent");
                self.draft.clear();
                self.product = None;
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(error = %e, receiver = %receiver_id, "Send failed, keeping draft");
                Err(e)
            }
        }
    }
}

fn validate(content: &str) -> Result<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(ChatError::EmptyMessage)
    } else {
        Ok(trimmed)
    }
}

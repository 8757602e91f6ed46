//! Push channel wire protocol.
//!
//! The server emits JSON text frames tagged by an `event` field:
//!
//! ```json
//! {"event": "message:new", "conversationId": "c1", "message": {...}}
//! {"event": "conversation:updated"}
//! {"event": "message:read", "conversationId": "c1"}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use souk_client::Message;

/// Events delivered by the push channel.
///
/// Delivery is at-least-once with no ordering guarantee, so consumers must
/// tolerate duplicates and reordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PushEvent {
    /// A message was stored in a conversation.
    #[serde(rename = "message:new", rename_all = "camelCase")]
    NewMessage {
        /// Conversation the message belongs to.
        conversation_id: String,
        /// The message itself. Informational only; never merged into caches.
        /// A payload that does not parse as a [`Message`] reads as `None`.
        #[serde(
            default,
            deserialize_with = "lenient_message",
            skip_serializing_if = "Option::is_none"
        )]
        message: Option<Message>,
    },

    /// Conversation metadata (previews, unread counts) changed.
    #[serde(rename = "conversation:updated", rename_all = "camelCase")]
    ConversationUpdated {
        /// The conversation, when the server says which one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },

    /// Messages in a conversation were read.
    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead {
        /// Conversation whose messages were read.
        conversation_id: String,
    },
}

impl PushEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::NewMessage { .. } => "message:new",
            PushEvent::ConversationUpdated { .. } => "conversation:updated",
            PushEvent::MessageRead { .. } => "message:read",
        }
    }

    /// Conversation the event refers to, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            PushEvent::NewMessage {
                conversation_id, ..
            }
            | PushEvent::MessageRead { conversation_id } => Some(conversation_id),
            PushEvent::ConversationUpdated { conversation_id } => conversation_id.as_deref(),
        }
    }
}

/// Parse the optional message payload without letting its shape reject the frame.
fn lenient_message<'de, D>(deserializer: D) -> Result<Option<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unrecognized message payload");
            None
        }
    }))
}

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticate the connection.
    Auth {
        /// Bearer token.
        token: String,
    },
}

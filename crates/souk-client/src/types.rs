//! Request and response types for the Souk chat API.
//!
//! These types mirror the server's JSON contract, which uses camelCase field
//! names and, for documents coming straight from the database, `_id` instead
//! of `id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to a user as embedded in conversations and messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User ID.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl UserRef {
    /// Create a user reference without an avatar.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
        }
    }
}

/// Response for a single user lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    /// The user.
    pub user: UserRef,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

/// Preview of the most recent message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    /// Message text.
    pub content: String,
    /// When the message was sent.
    pub created_at: DateTime<Utc>,
}

/// A two-party conversation as seen by the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation ID.
    #[serde(alias = "_id")]
    pub id: String,
    /// Participants. The server lists the other party first.
    #[serde(default)]
    pub participants: Vec<UserRef>,
    /// Latest message preview.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Messages the authenticated user has not read yet.
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// The other party of a two-party chat.
    pub fn counterpart(&self) -> Option<&UserRef> {
        self.participants.first()
    }

    /// Whether `user_id` takes part in this conversation.
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }
}

/// Response for list conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConversationsResponse {
    /// Conversations, most recently active first.
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Product metadata attached to a single message.
///
/// This is a snapshot taken when the message was written. The product may
/// since have changed price or been removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductContext {
    /// Product ID, for deep-linking back to the listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Product title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Price at the time of sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A marketplace listing, as far as chat needs to know it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product ID.
    #[serde(alias = "_id")]
    pub id: String,
    /// Listing title.
    pub title: String,
    /// Current price.
    pub price: f64,
    /// Image URLs, cover image first.
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductContext {
    /// Create a snapshot for a product id.
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: Some(product_id.into()),
            ..Default::default()
        }
    }

    /// Snapshot a listing as it is right now.
    pub fn from_product(product: &Product) -> Self {
        Self {
            product_id: Some(product.id.clone()),
            title: Some(product.title.clone()),
            price: Some(product.price),
            image: product.images.first().cloned(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the price.
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the image URL.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// True when no field carries information.
    pub fn is_empty(&self) -> bool {
        self.product_id.is_none()
            && self.title.is_none()
            && self.price.is_none()
            && self.image.is_none()
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID.
    #[serde(alias = "_id")]
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author.
    pub sender: UserRef,
    /// Text content.
    pub content: String,
    /// When the message was sent.
    pub created_at: DateTime<Utc>,
    /// Attached product snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductContext>,
}

/// Response for list messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    /// Messages in the conversation.
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Request to send a message.
///
/// Messages are addressed to a user, not a conversation; the server finds or
/// creates the conversation between sender and receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Recipient user ID.
    pub receiver_id: String,
    /// Message content.
    pub content: String,
    /// Optional product snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductContext>,
}

impl SendMessageRequest {
    /// Create a plain text message request.
    pub fn new(receiver_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            content: content.into(),
            product: None,
        }
    }

    /// Attach a product snapshot.
    pub fn with_product(mut self, product: ProductContext) -> Self {
        self.product = Some(product);
        self
    }
}

/// Response for send message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// The stored message.
    pub message: Message,
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status string.
    pub status: String,
    /// Server version.
    #[serde(default)]
    pub version: Option<String>,
}

//! Query keys and the fetcher that loads them through a gateway.

use crate::gateway::ChatGateway;
use async_trait::async_trait;
use souk_cache::{QueryCache, QueryFetcher};
use souk_client::{Conversation, Message};
use std::fmt;
use std::sync::Arc;

/// Cache of chat queries backed by gateway `G`.
pub type ChatCache<G> = QueryCache<ChatFetcher<G>>;

/// Cache key for a remote query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatQuery {
    /// The authenticated user's conversation list.
    Conversations,
    /// The thread of one conversation.
    Messages(String),
}

impl ChatQuery {
    /// Key for a conversation's thread.
    pub fn messages(conversation_id: impl Into<String>) -> Self {
        Self::Messages(conversation_id.into())
    }
}

impl fmt::Display for ChatQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversations => write!(f, "conversations"),
            Self::Messages(id) => write!(f, "messages/{}", id),
        }
    }
}

/// Value stored under a [`ChatQuery`].
///
/// Payloads are shared so that reads hand out cheap clones.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatData {
    Conversations(Arc<Vec<Conversation>>),
    Messages(Arc<Vec<Message>>),
}

impl ChatData {
    /// The conversation list, if this is one.
    pub fn conversations(&self) -> Option<Arc<Vec<Conversation>>> {
        match self {
            Self::Conversations(list) => Some(list.clone()),
            Self::Messages(_) => None,
        }
    }

    /// The thread, if this is one.
    pub fn messages(&self) -> Option<Arc<Vec<Message>>> {
        match self {
            Self::Messages(list) => Some(list.clone()),
            Self::Conversations(_) => None,
        }
    }
}

/// Loads chat queries from a [`ChatGateway`].
pub struct ChatFetcher<G> {
    gateway: Arc<G>,
}

impl<G: ChatGateway> ChatFetcher<G> {
    /// Create a fetcher over a shared gateway.
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// The underlying gateway.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }
}

#[async_trait]
impl<G: ChatGateway> QueryFetcher for ChatFetcher<G> {
    type Key = ChatQuery;
    type Value = ChatData;

    async fn fetch(&self, key: &ChatQuery) -> souk_cache::Result<ChatData> {
        match key {
            ChatQuery::Conversations => {
                let list = self
                    .gateway
                    .list_conversations()
                    .await
                    .map_err(souk_cache::Error::fetch)?;
                Ok(ChatData::Conversations(Arc::new(list)))
            }
            ChatQuery::Messages(conversation_id) => {
                let mut list = self
                    .gateway
                    .list_messages(conversation_id)
                    .await
                    .map_err(souk_cache::Error::fetch)?;
                // Display order is oldest first, re-derived on every fetch
                list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                Ok(ChatData::Messages(Arc::new(list)))
            }
        }
    }
}

//! Push event to cache invalidation mapping.
//!
//! Push events are hints that something changed on the server. Their
//! payloads are never merged into the cache; the affected queries are
//! invalidated and refetched from the gateway instead, which makes
//! duplicate and reordered deliveries harmless.

use crate::channel::PushSource;
use crate::gateway::ChatGateway;
use crate::protocol::PushEvent;
use crate::query::{ChatCache, ChatQuery};
use crate::resolver::Resolution;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Queries that `event` makes stale, given the open conversation.
///
/// | Event                  | Invalidates                                   |
/// |------------------------|-----------------------------------------------|
/// | `message:new`          | conversations; the thread if it is open       |
/// | `conversation:updated` | conversations                                 |
/// | `message:read`         | the thread if it is open                      |
pub fn invalidations_for(event: &PushEvent, active: Option<&str>) -> Vec<ChatQuery> {
    let is_active = |id: &str| active == Some(id);

    match event {
        PushEvent::NewMessage {
            conversation_id, ..
        } => {
            let mut keys = vec![ChatQuery::Conversations];
            if is_active(conversation_id) {
                keys.push(ChatQuery::messages(conversation_id.as_str()));
            }
            keys
        }
        PushEvent::ConversationUpdated { .. } => vec![ChatQuery::Conversations],
        PushEvent::MessageRead { conversation_id } if is_active(conversation_id) => {
            vec![ChatQuery::messages(conversation_id.as_str())]
        }
        PushEvent::MessageRead { .. } => Vec::new(),
    }
}

/// Listens to a push source and invalidates cache entries.
pub struct InvalidationCoordinator<G: ChatGateway> {
    cache: ChatCache<G>,
    active: watch::Receiver<Resolution>,
    listener: Option<JoinHandle<()>>,
}

impl<G: ChatGateway> InvalidationCoordinator<G> {
    /// Create a detached coordinator.
    pub fn new(cache: ChatCache<G>, active: watch::Receiver<Resolution>) -> Self {
        Self {
            cache,
            active,
            listener: None,
        }
    }

    /// Start listening to `source`.
    ///
    /// Returns false, and changes nothing, if already attached.
    pub fn attach(&mut self, source: &dyn PushSource) -> bool {
        if self.listener.is_some() {
            tracing::warn!("Invalidation coordinator already attached, ignoring");
            return false;
        }

        let mut events = source.subscribe();
        let cache = self.cache.clone();
        let active = self.active.clone();

        self.listener = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        apply(&cache, &active, &event);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Unknown events were lost; assume the worst
                        tracing::warn!(missed, "Push listener lagged, refreshing everything");
                        let open = active.borrow().active_conversation().map(str::to_string);
                        cache.invalidate(&ChatQuery::Conversations);
                        if let Some(id) = open {
                            cache.invalidate(&ChatQuery::Messages(id));
                        }
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Push source closed");
                        break;
                    }
                }
            }
        }));
        tracing::debug!("Invalidation coordinator attached");
        true
    }

    /// Stop listening. Returns false if not attached.
    pub fn detach(&mut self) -> bool {
        match self.listener.take() {
            Some(listener) => {
                listener.abort();
                tracing::debug!("Invalidation coordinator detached");
                true
            }
            None => false,
        }
    }

    /// Whether a listener is running.
    pub fn is_attached(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| !l.is_finished())
    }
}

impl<G: ChatGateway> Drop for InvalidationCoordinator<G> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn apply<G: ChatGateway>(
    cache: &ChatCache<G>,
    active: &watch::Receiver<Resolution>,
    event: &PushEvent,
) {
    let keys = {
        let resolution = active.borrow();
        invalidations_for(event, resolution.active_conversation())
    };
    tracing::debug!(event = event.name(), ?keys, "Invalidating for push event");
    for key in &keys {
        cache.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(id: &str) -> PushEvent {
        PushEvent::NewMessage {
            conversation_id: id.to_string(),
            message: None,
        }
    }

    #[test]
    fn test_new_message_for_open_conversation() {
        assert_eq!(
            invalidations_for(&new_message("c1"), Some("c1")),
            vec![ChatQuery::Conversations, ChatQuery::messages("c1")]
        );
    }

    #[test]
    fn test_new_message_elsewhere_only_touches_list() {
        assert_eq!(
            invalidations_for(&new_message("c2"), Some("c1")),
            vec![ChatQuery::Conversations]
        );
        assert_eq!(
            invalidations_for(&new_message("c2"), None),
            vec![ChatQuery::Conversations]
        );
    }

    #[test]
    fn test_conversation_updated() {
        let event = PushEvent::ConversationUpdated {
            conversation_id: Some("c1".to_string()),
        };
        assert_eq!(
            invalidations_for(&event, Some("c1")),
            vec![ChatQuery::Conversations]
        );
    }

    #[test]
    fn test_message_read() {
        let event = PushEvent::MessageRead {
            conversation_id: "c1".to_string(),
        };
        assert_eq!(
            invalidations_for(&event, Some("c1")),
            vec![ChatQuery::messages("c1")]
        );
        assert!(invalidations_for(&event, Some("c2")).is_empty());
        assert!(invalidations_for(&event, None).is_empty());
    }
}

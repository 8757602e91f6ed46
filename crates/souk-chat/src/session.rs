//! Chat session: the mounted chat surface.
//!
//! A [`ChatSession`] wires the pieces together for one authenticated user:
//! it owns the query cache, attaches the invalidation coordinator to a push
//! source, keeps the resolver reconciled with the conversation list, keeps
//! the open thread subscribed, and routes sends through the composer.
//! Mounting starts all of it; disposing (or dropping) stops all of it.

use crate::channel::PushSource;
use crate::composer::{Composer, SendOutcome};
use crate::coordinator::InvalidationCoordinator;
use crate::error::{ChatError, Result};
use crate::gateway::ChatGateway;
use crate::persisted::{KeyValueStore, SessionStore};
use crate::query::{ChatCache, ChatData, ChatFetcher, ChatQuery};
use crate::resolver::{ConversationResolver, Resolution, TargetUser};
use parking_lot::Mutex;
use souk_cache::{CacheConfig, CacheEntry, CacheEvent, QueryCache, Subscription};
use souk_client::{Conversation, Message};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Options for mounting a session.
#[derive(Debug, Clone)]
pub struct ChatSessionConfig {
    /// Authenticated user ID.
    pub owner: String,
    /// User to open a conversation with, if the caller asked for one.
    pub target: Option<TargetUser>,
    /// Query cache settings.
    pub cache: CacheConfig,
    /// Storage key of the persisted last-session record.
    pub session_key: Option<String>,
}

impl ChatSessionConfig {
    /// Options for `owner` with defaults.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            target: None,
            cache: CacheConfig::default(),
            session_key: None,
        }
    }

    /// Open a conversation with `target`.
    pub fn with_target(mut self, target: TargetUser) -> Self {
        self.target = Some(target);
        self
    }

    /// Use these cache settings.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Persist the last-session record under `key`.
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }
}

/// A mounted chat surface for one user.
pub struct ChatSession<G: ChatGateway> {
    owner: String,
    gateway: Arc<G>,
    cache: ChatCache<G>,
    resolver: Arc<Mutex<ConversationResolver>>,
    resolution: watch::Receiver<Resolution>,
    coordinator: InvalidationCoordinator<G>,
    composer: Composer<G>,
    _conversations: Subscription<ChatFetcher<G>>,
    tasks: TaskSet,
}

impl<G: ChatGateway> ChatSession<G> {
    /// Mount a session.
    ///
    /// The persisted record is read before the conversation list starts
    /// loading. Must be called within a tokio runtime.
    pub fn mount(
        gateway: Arc<G>,
        push: &dyn PushSource,
        store: Arc<dyn KeyValueStore>,
        config: ChatSessionConfig,
    ) -> Self {
        let ChatSessionConfig {
            owner,
            target,
            cache: cache_config,
            session_key,
        } = config;

        let mut sessions = SessionStore::new(store);
        if let Some(key) = session_key {
            sessions = sessions.with_key(key);
        }
        let resolver = ConversationResolver::new(&owner, target.clone(), sessions);
        let resolution = resolver.watch();
        let resolver = Arc::new(Mutex::new(resolver));

        let cache = QueryCache::new(cache_config, ChatFetcher::new(gateway.clone()));

        let mut coordinator = InvalidationCoordinator::new(cache.clone(), resolution.clone());
        coordinator.attach(push);

        // Listen before the first fetch so its completion is not missed
        let events = cache.events();
        let conversations = cache.subscribe(ChatQuery::Conversations);

        let tasks = TaskSet::default();
        tasks.spawn(sync_loop(
            cache.clone(),
            gateway.clone(),
            resolver.clone(),
            resolution.clone(),
            events,
            tasks.clone(),
        ));
        if let Some(target) = target.filter(|t| t.display_name.is_none()) {
            tasks.spawn(lookup_name(
                gateway.clone(),
                resolver.clone(),
                target.user_id,
            ));
        }

        tracing::info!(owner = %owner, "Chat session mounted");

        Self {
            composer: Composer::new(&owner, gateway.clone(), cache.clone()),
            owner,
            gateway,
            cache,
            resolver,
            resolution,
            coordinator,
            _conversations: conversations,
            tasks,
        }
    }

    /// Tear the session down: detach from the push source and release
    /// every cache subscription.
    pub fn dispose(self) {
        tracing::info!(owner = %self.owner, "Chat session disposed");
    }

    /// The authenticated user.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The underlying query cache.
    pub fn cache(&self) -> &ChatCache<G> {
        &self.cache
    }

    /// Whether push events are being applied.
    pub fn is_attached(&self) -> bool {
        self.coordinator.is_attached()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Current resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution.borrow().clone()
    }

    /// Watch resolution changes.
    pub fn watch_resolution(&self) -> watch::Receiver<Resolution> {
        self.resolution.clone()
    }

    /// Cache change notifications, for re-rendering.
    pub fn changes(&self) -> broadcast::Receiver<CacheEvent<ChatQuery>> {
        self.cache.events()
    }

    /// Conversation list, once loaded.
    pub fn conversations(&self) -> Option<Arc<Vec<Conversation>>> {
        self.cache
            .value(&ChatQuery::Conversations)
            .and_then(|data| data.conversations())
    }

    /// Conversation list entry with fetch status and last error.
    pub fn conversations_entry(&self) -> Option<CacheEntry<ChatData>> {
        self.cache.get(&ChatQuery::Conversations)
    }

    /// Thread of the open conversation, oldest first.
    pub fn thread(&self) -> Option<Arc<Vec<Message>>> {
        let id = self.resolution().active_conversation()?.to_string();
        self.cache
            .value(&ChatQuery::Messages(id))
            .and_then(|data| data.messages())
    }

    /// Thread entry of the open conversation.
    pub fn thread_entry(&self) -> Option<CacheEntry<ChatData>> {
        let id = self.resolution().active_conversation()?.to_string();
        self.cache.get(&ChatQuery::Messages(id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a conversation from the loaded list.
    pub fn select(&self, conversation_id: &str) -> Result<Resolution> {
        let conversation = self
            .conversations()
            .and_then(|list| list.iter().find(|c| c.id == conversation_id).cloned())
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?;
        Ok(self.resolver.lock().select(&conversation))
    }

    /// Open the conversation with `target`, or make it pending.
    pub fn open_with(&mut self, target: TargetUser) -> Resolution {
        let needs_name = target.display_name.is_none();
        let user_id = target.user_id.clone();

        let list = self.conversations();
        let resolution = self
            .resolver
            .lock()
            .set_target(Some(target), list.as_deref().map(Vec::as_slice));

        if needs_name {
            self.tasks.spawn(lookup_name(
                self.gateway.clone(),
                self.resolver.clone(),
                user_id,
            ));
        }
        resolution
    }

    /// Invalidate the list and the open thread.
    pub fn refresh(&self) {
        self.cache.invalidate(&ChatQuery::Conversations);
        if let Some(id) = self.resolution().active_conversation() {
            self.cache.invalidate(&ChatQuery::messages(id));
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// The composer, for draft and product handling.
    pub fn composer(&self) -> &Composer<G> {
        &self.composer
    }

    /// Mutable composer access.
    pub fn composer_mut(&mut self) -> &mut Composer<G> {
        &mut self.composer
    }

    /// Send `content` to whatever is open.
    ///
    /// A send to a pending target moves the resolution to the conversation
    /// the server created.
    pub async fn send(&mut self, content: &str) -> Result<SendOutcome> {
        match self.resolution() {
            Resolution::Active(conversation_id) => {
                self.composer
                    .send_into_existing(&conversation_id, content)
                    .await
            }
            Resolution::PendingNewTarget(target) => {
                let outcome = self
                    .composer
                    .send_to_new_target(&target.user_id, content)
                    .await?;
                self.resolver.lock().apply_send_outcome(&outcome);
                Ok(outcome)
            }
            Resolution::Unresolved => {
                self.composer.set_draft(content);
                Err(ChatError::NoActiveConversation)
            }
        }
    }
}

impl<G: ChatGateway> Drop for ChatSession<G> {
    fn drop(&mut self) {
        self.coordinator.detach();
        self.tasks.abort_all();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Background tasks owned by a session.
///
/// Finished handles are pruned on every spawn. Once aborted the set stays
/// closed, so a task racing with dispose cannot start new work.
#[derive(Clone, Default)]
struct TaskSet {
    inner: Arc<Mutex<TaskList>>,
}

#[derive(Default)]
struct TaskList {
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

impl TaskSet {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut list = self.inner.lock();
        if list.closed {
            return;
        }
        list.handles.retain(|handle| !handle.is_finished());
        list.handles.push(tokio::spawn(task));
    }

    fn abort_all(&self) {
        let mut list = self.inner.lock();
        list.closed = true;
        for handle in list.handles.drain(..) {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().handles.len()
    }
}

/// Keep the resolver and the open thread in step with the cache.
async fn sync_loop<G: ChatGateway>(
    cache: ChatCache<G>,
    gateway: Arc<G>,
    resolver: Arc<Mutex<ConversationResolver>>,
    mut resolution: watch::Receiver<Resolution>,
    mut events: broadcast::Receiver<CacheEvent<ChatQuery>>,
    tasks: TaskSet,
) {
    let mut thread: Option<Subscription<ChatFetcher<G>>> = None;
    let initial = resolution.borrow_and_update().clone();
    follow_thread(&cache, &gateway, &tasks, &mut thread, &initial);
    reconcile(&cache, &resolver);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CacheEvent::Updated { key: ChatQuery::Conversations }) => {
                    reconcile(&cache, &resolver);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Session lagged behind cache events");
                    reconcile(&cache, &resolver);
                }
                Err(RecvError::Closed) => break,
            },
            changed = resolution.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = resolution.borrow_and_update().clone();
                follow_thread(&cache, &gateway, &tasks, &mut thread, &current);
            }
        }
    }
}

fn reconcile<G: ChatGateway>(cache: &ChatCache<G>, resolver: &Mutex<ConversationResolver>) {
    let list = cache
        .value(&ChatQuery::Conversations)
        .and_then(|data| data.conversations());
    resolver.lock().reconcile(list.as_deref().map(Vec::as_slice));
}

/// Subscribe to the open conversation's thread and mark it read.
fn follow_thread<G: ChatGateway>(
    cache: &ChatCache<G>,
    gateway: &Arc<G>,
    tasks: &TaskSet,
    thread: &mut Option<Subscription<ChatFetcher<G>>>,
    resolution: &Resolution,
) {
    let Some(id) = resolution.active_conversation() else {
        *thread = None;
        return;
    };
    if thread
        .as_ref()
        .is_some_and(|sub| *sub.key() == ChatQuery::Messages(id.to_string()))
    {
        return;
    }

    *thread = None;
    *thread = Some(cache.subscribe(ChatQuery::messages(id)));

    let unread = cache
        .value(&ChatQuery::Conversations)
        .and_then(|data| data.conversations())
        .and_then(|list| list.iter().find(|c| c.id == id).map(|c| c.unread_count))
        .unwrap_or(0);

    let gateway = gateway.clone();
    let cache = cache.clone();
    let id = id.to_string();
    tasks.spawn(async move {
        match gateway.mark_read(&id).await {
            Ok(()) if unread > 0 => {
                cache.invalidate(&ChatQuery::Conversations);
            }
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, conversation = %id, "Failed to mark conversation read");
            }
        }
    });
}

async fn lookup_name<G: ChatGateway>(
    gateway: Arc<G>,
    resolver: Arc<Mutex<ConversationResolver>>,
    user_id: String,
) {
    match gateway.get_user(&user_id).await {
        Ok(user) => resolver.lock().name_target(&user_id, &user.name),
        Err(e) => {
            tracing::debug!(error = %e, user = %user_id, "Could not look up target user");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_task_set_prunes_finished_handles() {
        let tasks = TaskSet::default();
        for _ in 0..5 {
            let (done_tx, done_rx) = oneshot::channel();
            tasks.spawn(async move {
                let _ = done_tx.send(());
            });
            done_rx.await.unwrap();
            // The task has sent but may not have been reaped by the runtime yet
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(tasks.len() <= 1);

        let (_hold_tx, hold_rx) = oneshot::channel::<()>();
        tasks.spawn(async move {
            let _ = hold_rx.await;
        });
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_task_set_abort_stops_running_and_later_tasks() {
        let tasks = TaskSet::default();
        let ran = Arc::new(AtomicBool::new(false));

        let (release_tx, release_rx) = oneshot::channel::<()>();
        let flag = ran.clone();
        tasks.spawn(async move {
            let _ = release_rx.await;
            flag.store(true, Ordering::SeqCst);
        });

        tasks.abort_all();
        assert_eq!(tasks.len(), 0);
        let _ = release_tx.send(());

        let flag = ran.clone();
        tasks.spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tasks.len(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}

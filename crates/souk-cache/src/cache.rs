//! Query cache with coalesced background refetch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::fetcher::QueryFetcher;

/// Whether a fetch is currently running for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// No fetch running.
    Idle,
    /// At least one fetch running.
    Fetching,
}

/// Snapshot of a cached query.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Last successfully fetched (or explicitly set) value.
    pub value: Option<V>,

    /// Fetch status at the time of the snapshot.
    pub status: FetchStatus,

    /// Set by invalidation, cleared by the next applied fetch.
    pub stale: bool,

    /// Error from the most recent failed fetch, cleared by the next success.
    pub error: Option<Error>,

    /// When `value` was last written.
    pub updated_at: Option<Instant>,

    /// When the entry was last invalidated.
    pub last_invalidated_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn empty() -> Self {
        Self {
            value: None,
            status: FetchStatus::Idle,
            stale: false,
            error: None,
            updated_at: None,
            last_invalidated_at: None,
        }
    }

    /// Whether a fetch is running.
    pub fn is_fetching(&self) -> bool {
        self.status == FetchStatus::Fetching
    }

    /// Whether at least one fetch has completed for this entry.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the value should be refetched before being trusted.
    fn needs_refresh(&self, stale_time: Option<Duration>) -> bool {
        if self.stale || self.value.is_none() {
            return true;
        }
        match (stale_time, self.updated_at) {
            (Some(max_age), Some(at)) => at.elapsed() > max_age,
            _ => false,
        }
    }
}

/// Change notification published by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent<K> {
    /// A new value was stored for `key`.
    Updated { key: K },
    /// A fetch for `key` failed; the previous value was kept.
    Failed { key: K, error: String },
    /// `key` was evicted to make room.
    Evicted { key: K },
}

/// Per-key bookkeeping.
struct Slot<V> {
    entry: CacheEntry<V>,

    /// Live [`Subscription`]s for this key.
    subscribers: usize,

    /// Fetches of any kind currently running.
    fetches: usize,

    /// Whether an invalidation-driven refetch is running.
    background: bool,

    /// An invalidation arrived while the background refetch was running.
    refetch_queued: bool,

    /// Ticket of the fetch (or `set`) whose value is currently stored.
    applied_ticket: u64,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            entry: CacheEntry::empty(),
            subscribers: 0,
            fetches: 0,
            background: false,
            refetch_queued: false,
            applied_ticket: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.subscribers == 0 && self.fetches == 0
    }
}

/// State protected by the mutex. Never held across an await point.
struct CacheState<K, V> {
    slots: LruCache<K, Slot<V>>,

    /// Monotonic source of fetch tickets.
    next_ticket: u64,
}

impl<K: std::hash::Hash + Eq + Clone + std::fmt::Debug, V> CacheState<K, V> {
    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Register a fetch for `key`, creating the slot if needed.
    fn start_fetch(&mut self, key: &K, background: bool) -> u64 {
        let ticket = self.take_ticket();
        let slot = self.slots.get_or_insert_mut(key.clone(), Slot::new);
        slot.fetches += 1;
        if background {
            slot.background = true;
        }
        slot.entry.status = FetchStatus::Fetching;
        trace!(key = ?key, ticket, background, "Fetch registered");
        ticket
    }

    /// Pop least recently used idle entries until within `max`.
    fn evict_idle(&mut self, max: usize) -> Vec<K> {
        let mut evicted = Vec::new();
        while self.slots.len() > max {
            let victim = self
                .slots
                .iter()
                .rev()
                .find(|(_, slot)| slot.is_idle())
                .map(|(key, _)| key.clone());

            match victim {
                Some(key) => {
                    debug!(key = ?key, "Evicting idle query to make room");
                    self.slots.pop(&key);
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }
}

struct Shared<F: QueryFetcher> {
    state: Mutex<CacheState<F::Key, F::Value>>,
    fetcher: F,
    events: broadcast::Sender<CacheEvent<F::Key>>,
    config: CacheConfig,
}

/// Keyed cache of remote query results.
///
/// This cache provides:
/// - `get`/`set`/`invalidate` over opaque query keys
/// - Background refetch on invalidation, only while the key is subscribed
/// - At most one invalidation-driven refetch in flight per key, with further
///   invalidations coalesced into a single pending refetch
/// - Stale-while-revalidate: the previous value stays readable throughout
/// - A ticket guard so a slow response never overwrites fresher data
///
/// Background fetches are spawned on the ambient tokio runtime, so methods
/// that may start one (`subscribe`, `invalidate`) must be called from within
/// a runtime.
pub struct QueryCache<F: QueryFetcher> {
    inner: Arc<Shared<F>>,
}

impl<F: QueryFetcher> QueryCache<F> {
    /// Create a new cache backed by `fetcher`.
    pub fn new(config: CacheConfig, fetcher: F) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = CacheState {
            slots: LruCache::unbounded(),
            next_ticket: 0,
        };

        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                fetcher,
                events,
                config,
            }),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get the fetcher backing this cache.
    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    /// Subscribe to change notifications.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent<F::Key>> {
        self.inner.events.subscribe()
    }

    /// Current number of cached queries.
    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().slots.is_empty()
    }

    /// Snapshot the entry for `key`, marking it recently used.
    ///
    /// Once a value has been fetched it stays in the snapshot while any
    /// later refetch is running.
    pub fn get(&self, key: &F::Key) -> Option<CacheEntry<F::Value>> {
        let mut state = self.inner.state.lock();
        state.slots.get(key).map(|slot| slot.entry.clone())
    }

    /// Last known value for `key`.
    pub fn value(&self, key: &F::Key) -> Option<F::Value> {
        self.get(key).and_then(|entry| entry.value)
    }

    /// Number of live subscriptions for `key`.
    pub fn subscriber_count(&self, key: &F::Key) -> usize {
        let state = self.inner.state.lock();
        state.slots.peek(key).map_or(0, |slot| slot.subscribers)
    }

    /// Store a value directly.
    ///
    /// Counts as the freshest data: fetches that started earlier and resolve
    /// later are discarded.
    pub fn set(&self, key: F::Key, value: F::Value) {
        let evicted = {
            let mut state = self.inner.state.lock();
            let ticket = state.take_ticket();
            let slot = state.slots.get_or_insert_mut(key.clone(), Slot::new);
            slot.applied_ticket = ticket;
            slot.entry.value = Some(value);
            slot.entry.stale = false;
            slot.entry.error = None;
            slot.entry.updated_at = Some(Instant::now());
            state.evict_idle(self.inner.config.max_entries)
        };

        trace!(key = ?key, "Query value set");
        self.emit(CacheEvent::Updated { key });
        self.emit_evicted(evicted);
    }

    /// Mark `key` stale and refetch it if anyone is subscribed.
    ///
    /// Returns whether a new background fetch was started. Invalidating an
    /// unknown or unsubscribed key only marks it stale; the next subscriber
    /// triggers the fetch. While a refetch is already in flight, any number
    /// of invalidations collapse into one follow-up refetch.
    pub fn invalidate(&self, key: &F::Key) -> bool {
        let ticket = {
            let mut state = self.inner.state.lock();
            let Some(slot) = state.slots.peek_mut(key) else {
                trace!(key = ?key, "Invalidated unknown query, nothing to do");
                return false;
            };

            slot.entry.stale = true;
            slot.entry.last_invalidated_at = Some(Instant::now());

            if slot.subscribers == 0 {
                debug!(key = ?key, "Invalidated unsubscribed query, refetch deferred");
                return false;
            }

            if slot.background {
                slot.refetch_queued = true;
                debug!(key = ?key, "Refetch in flight, coalescing invalidation");
                return false;
            }

            state.start_fetch(key, true)
        };

        debug!(key = ?key, ticket, "Query invalidated, refetching");
        self.spawn_refetch(key.clone(), ticket);
        true
    }

    /// Keep `key` live and make sure it is (or will be) fetched.
    ///
    /// A fetch starts when the entry has no value yet, was invalidated, or is
    /// older than the configured stale time. Dropping the returned handle
    /// releases the subscription.
    pub fn subscribe(&self, key: F::Key) -> Subscription<F> {
        let (ticket, evicted) = {
            let mut state = self.inner.state.lock();
            let stale_time = self.inner.config.stale_time;
            let slot = state.slots.get_or_insert_mut(key.clone(), Slot::new);
            slot.subscribers += 1;
            let needs_fetch = !slot.background && slot.entry.needs_refresh(stale_time);
            let subscribers = slot.subscribers;

            let ticket = needs_fetch.then(|| state.start_fetch(&key, true));
            trace!(key = ?key, subscribers, fetching = ticket.is_some(), "Query subscribed");
            (ticket, state.evict_idle(self.inner.config.max_entries))
        };

        if let Some(ticket) = ticket {
            self.spawn_refetch(key.clone(), ticket);
        }
        self.emit_evicted(evicted);

        Subscription {
            cache: self.clone(),
            key,
        }
    }

    /// Fetch `key` now and wait for the result.
    ///
    /// Runs independently of any background refetch. The result is stored
    /// unless fresher data has been applied in the meantime.
    pub async fn fetch(&self, key: &F::Key) -> Result<F::Value> {
        let ticket = self.inner.state.lock().start_fetch(key, false);
        let result = self.inner.fetcher.fetch(key).await;
        self.complete(key, ticket, false, result.clone());
        result
    }

    /// Remove an entry. Running fetches for it are discarded on completion.
    pub fn remove(&self, key: &F::Key) -> Option<F::Value> {
        let mut state = self.inner.state.lock();
        state.slots.pop(key).and_then(|slot| slot.entry.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let count = state.slots.len();
        state.slots.clear();
        debug!(count, "Query cache cleared");
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut stats = CacheStats {
            size: state.slots.len(),
            capacity: self.inner.config.max_entries,
            subscribed: 0,
            fetching: 0,
        };
        for (_, slot) in state.slots.iter() {
            if slot.subscribers > 0 {
                stats.subscribed += 1;
            }
            if slot.fetches > 0 {
                stats.fetching += 1;
            }
        }
        stats
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetch plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a background refetch, then any refetch queued while it ran.
    fn spawn_refetch(&self, key: F::Key, ticket: u64) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticket = ticket;
            loop {
                let result = cache.inner.fetcher.fetch(&key).await;
                match cache.complete(&key, ticket, true, result) {
                    Some(next) => ticket = next,
                    None => break,
                }
            }
        });
    }

    /// Record the outcome of a fetch.
    ///
    /// Returns the ticket of a queued follow-up refetch the caller must run.
    fn complete(
        &self,
        key: &F::Key,
        ticket: u64,
        background: bool,
        result: Result<F::Value>,
    ) -> Option<u64> {
        let mut event = None;

        let follow_up = {
            let mut state = self.inner.state.lock();
            let Some(slot) = state.slots.peek_mut(key) else {
                debug!(key = ?key, ticket, "Query removed while fetching, discarding result");
                return None;
            };

            slot.fetches = slot.fetches.saturating_sub(1);
            if slot.fetches == 0 {
                slot.entry.status = FetchStatus::Idle;
            }
            if background {
                slot.background = false;
            }

            if ticket <= slot.applied_ticket {
                debug!(
                    key = ?key,
                    ticket,
                    applied = slot.applied_ticket,
                    "Discarding superseded fetch result"
                );
            } else {
                match result {
                    Ok(value) => {
                        slot.applied_ticket = ticket;
                        slot.entry.value = Some(value);
                        slot.entry.stale = slot.refetch_queued;
                        slot.entry.error = None;
                        slot.entry.updated_at = Some(Instant::now());
                        trace!(key = ?key, ticket, "Fetch result applied");
                        event = Some(CacheEvent::Updated { key: key.clone() });
                    }
                    Err(err) => {
                        warn!(key = ?key, error = %err, "Query fetch failed, keeping last known value");
                        event = Some(CacheEvent::Failed {
                            key: key.clone(),
                            error: err.to_string(),
                        });
                        slot.entry.error = Some(err);
                    }
                }
            }

            if background && slot.refetch_queued {
                slot.refetch_queued = false;
                if slot.subscribers > 0 {
                    Some(state.start_fetch(key, true))
                } else {
                    None
                }
            } else {
                None
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
        follow_up
    }

    fn emit(&self, event: CacheEvent<F::Key>) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn emit_evicted(&self, keys: Vec<F::Key>) {
        for key in keys {
            self.emit(CacheEvent::Evicted { key });
        }
    }
}

impl<F: QueryFetcher> Clone for QueryCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle keeping a query live. Dropping it unsubscribes.
pub struct Subscription<F: QueryFetcher> {
    cache: QueryCache<F>,
    key: F::Key,
}

impl<F: QueryFetcher> Subscription<F> {
    /// The subscribed key.
    pub fn key(&self) -> &F::Key {
        &self.key
    }

    /// Snapshot the subscribed entry.
    pub fn entry(&self) -> Option<CacheEntry<F::Value>> {
        self.cache.get(&self.key)
    }

    /// Last known value of the subscribed entry.
    pub fn value(&self) -> Option<F::Value> {
        self.cache.value(&self.key)
    }
}

impl<F: QueryFetcher> Drop for Subscription<F> {
    fn drop(&mut self) {
        let mut state = self.cache.inner.state.lock();
        if let Some(slot) = state.slots.peek_mut(&self.key) {
            slot.subscribers = slot.subscribers.saturating_sub(1);
            trace!(key = ?self.key, subscribers = slot.subscribers, "Query unsubscribed");
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of cached queries.
    pub size: usize,

    /// Maximum capacity for idle entries.
    pub capacity: usize,

    /// Entries with at least one subscriber.
    pub subscribed: usize,

    /// Entries with a fetch running.
    pub fetching: usize,
}

//! Configuration for the query cache.

use std::time::Duration;

/// Default maximum number of cached queries.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Default capacity of the change-notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Configuration for the query cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before idle entries are evicted.
    /// Entries with subscribers or a fetch in flight are never evicted.
    pub max_entries: usize,

    /// Age after which a value is refetched when a new subscriber arrives.
    /// `None` keeps values fresh until explicitly invalidated.
    pub stale_time: Option<Duration>,

    /// Buffer size of the change-notification broadcast channel.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            stale_time: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached queries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the stale time.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Disable time-based staleness.
    pub fn without_stale_time(mut self) -> Self {
        self.stale_time = None;
        self
    }

    /// Set the change-notification buffer size.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

//! Query cache with stale-while-revalidate reads and coalesced refetches.
//!
//! This crate provides a keyed cache of remote query results with:
//! - Explicit invalidation that refetches only while someone is subscribed
//! - Coalescing of repeated invalidations into a single pending refetch
//! - Last-known values served while a refetch is in flight
//! - Out-of-order fetch results discarded in favour of fresher data
//! - LRU eviction of entries nobody is subscribed to
//!
//! # Example
//!
//! ```rust,ignore
//! use souk_cache::{CacheConfig, QueryCache};
//!
//! let cache = QueryCache::new(CacheConfig::default(), MyFetcher::new(client));
//!
//! // Keep the key live while a view renders it
//! let _sub = cache.subscribe(Key::Conversations);
//!
//! // A push event says the list changed
//! cache.invalidate(&Key::Conversations);
//! ```

mod cache;
mod config;
mod error;
mod fetcher;

pub use cache::{CacheEntry, CacheEvent, CacheStats, FetchStatus, QueryCache, Subscription};
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use fetcher::QueryFetcher;

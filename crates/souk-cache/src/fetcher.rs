//! Fetch hook connecting the cache to a remote source.
//!
//! The cache never talks to the network itself. It asks a [`QueryFetcher`]
//! for the current value of a key whenever an entry must be (re)loaded. The
//! associated `Key` and `Value` types let one fetcher serve several kinds of
//! query through a single cache, typically with enums on both sides.

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for query sources.
#[async_trait]
pub trait QueryFetcher: Send + Sync + 'static {
    /// Identifies one cacheable query.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// The value type stored in the cache.
    type Value: Clone + Send + Sync + 'static;

    /// Load the current value for `key`.
    ///
    /// Errors leave any previously cached value in place.
    async fn fetch(&self, key: &Self::Key) -> Result<Self::Value>;
}

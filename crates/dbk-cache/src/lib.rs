//! Resource cache for the DocBook importer.
//!
//! External resources pulled in while parsing (DTDs, entity sets, included
//! fragments) are kept in two tiers. Two traits form the core API:
//!
//! - [`Cache`]: Factory for named cache buckets
//! - [`CacheBucket`]: Key-value store of raw bytes
//!
//! # Implementations
//!
//! - [`NullCacheBucket`]: No-op bucket (always misses)
//! - [`FileCache`]: Persistent tier, one file per entry, no expiry
//! - [`MemoryCache`]: Bounded tier with strict least-recently-used eviction
//! - [`ResourceCache`]: Memory tier in front of a persistent bucket
//!
//! # Example
//!
//! ```
//! use dbk_cache::{CacheBucket, MemoryCache};
//!
//! let cache = MemoryCache::with_capacity(2);
//! cache.set("a", b"1");
//! cache.set("b", b"2");
//! cache.get("a");
//! cache.set("c", b"3");
//! assert_eq!(cache.get("b"), None); // least recently used
//! assert_eq!(cache.get("a"), Some(b"1".to_vec()));
//! ```

mod file;
mod memory;
mod tiered;

pub use file::{FileCache, safe_key};
pub use memory::{DEFAULT_CAPACITY, MemoryCache};
pub use tiered::ResourceCache;

/// A named partition within a [`Cache`].
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value, `None` on miss.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value, overwriting any existing entry for the same key.
    ///
    /// Write failures are not reported: a failed write only costs a later
    /// cache miss.
    fn set(&self, key: &str, value: &[u8]);
}

/// Factory for named cache [`CacheBucket`]s.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    ///
    /// # Arguments
    ///
    /// * `name` - Bucket name (e.g., "external")
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// No-op [`CacheBucket`] that never stores or retrieves data.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: &[u8]) {}
}

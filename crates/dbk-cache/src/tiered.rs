//! Memory tier in front of a persistent bucket.

use std::path::PathBuf;

use crate::{Cache, CacheBucket, FileCache, MemoryCache, NullCacheBucket};

/// Bucket name used for external resources on disk.
const EXTERNAL_BUCKET: &str = "external";

/// Process-wide cache for external resources.
///
/// Lookups try the bounded [`MemoryCache`] first, then the persistent bucket;
/// a persistent hit is promoted into memory. Stores write through to both
/// tiers. Construct one instance at startup and share it (`Arc`) between all
/// parses.
pub struct ResourceCache {
    memory: MemoryCache,
    persistent: Box<dyn CacheBucket>,
}

impl ResourceCache {
    /// Create a cache with `capacity` memory entries persisted under `dir`.
    ///
    /// With `dir == None` only the memory tier is active.
    #[must_use]
    pub fn new(capacity: usize, dir: Option<PathBuf>) -> Self {
        let persistent: Box<dyn CacheBucket> = match dir {
            Some(dir) => FileCache::new(dir).bucket(EXTERNAL_BUCKET),
            None => Box::new(NullCacheBucket),
        };
        Self::with_tiers(MemoryCache::with_capacity(capacity), persistent)
    }

    /// Create a cache from explicit tiers.
    #[must_use]
    pub fn with_tiers(memory: MemoryCache, persistent: Box<dyn CacheBucket>) -> Self {
        Self { memory, persistent }
    }

    /// The memory tier.
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::with_tiers(MemoryCache::default(), Box::new(NullCacheBucket))
    }
}

impl CacheBucket for ResourceCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(value) = self.memory.get(key) {
            tracing::debug!("memory cache hit: {key}");
            return Some(value);
        }
        let value = self.persistent.get(key)?;
        tracing::debug!("disk cache hit: {key}");
        self.memory.set(key, &value);
        Some(value)
    }

    fn set(&self, key: &str, value: &[u8]) {
        self.persistent.set(key, value);
        self.memory.set(key, value);
    }
}

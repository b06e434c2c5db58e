//! Entry-bounded LRU cache from input text to its embedding vector.
//!
//! Pure memoization: embedding is a function of text and the loaded model,
//! so entries are never invalidated by writes elsewhere in the system —
//! only by eviction or an optional TTL.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Configuration for the embedding cache.
#[derive(Debug, Clone)]
pub struct EmbeddingCacheConfig {
    pub max_entries: usize,
    pub ttl: Option<Duration>,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: None,
        }
    }
}

struct Entry {
    embedding: Vec<f32>,
    created_at: Instant,
}

/// Cache statistics, exposed for observability dashboards.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.hits as f64 / total as f64
            }
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Memoizing embedding cache, keyed by the input text verbatim.
pub struct EmbeddingCache {
    config: EmbeddingCacheConfig,
    entries: Mutex<LruCache<String, Entry>>,
    stats: Mutex<CacheStats>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("max_entries", &self.config.max_entries)
            .field("len", &self.entries.lock().len())
            .field("stats", &*self.stats.lock())
            .finish()
    }
}

impl EmbeddingCache {
    /// # Panics
    ///
    /// Panics if `config.max_entries` is zero.
    #[must_use]
    pub fn new(config: EmbeddingCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries)
            .expect("embedding cache capacity must be non-zero");
        Self {
            config,
            entries: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Look up `text`'s cached embedding, evicting it first if its TTL has
    /// elapsed.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock();
        let mut stats = self.stats.lock();

        if let Some(entry) = entries.peek(text) {
            if let Some(ttl) = self.config.ttl {
                if entry.created_at.elapsed() > ttl {
                    entries.pop(text);
                    stats.evictions += 1;
                    stats.misses += 1;
                    return None;
                }
            }
            let embedding = entries.get(text).map(|e| e.embedding.clone());
            stats.hits += 1;
            embedding
        } else {
            stats.misses += 1;
            None
        }
    }

    /// Store `text`'s embedding, evicting the least-recently-used entry if
    /// the cache is at capacity.
    pub fn put(&self, text: String, embedding: Vec<f32>) {
        let mut entries = self.entries.lock();
        let evicted = entries.put(
            text,
            Entry {
                embedding,
                created_at: Instant::now(),
            },
        );
        if evicted.is_some() {
            self.stats.lock().evictions += 1;
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        *self.stats.lock() = CacheStats::default();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Byte-bounded vector cache and entry-bounded embedding cache.

#![warn(missing_debug_implementations)]

pub mod embedding_cache;
pub mod vector_cache;

pub use embedding_cache::{CacheStats, EmbeddingCache, EmbeddingCacheConfig};
pub use vector_cache::VectorCache;

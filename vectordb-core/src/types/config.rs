//! Host-supplied configuration, mirrored from specification §6.1.

use super::record::DistanceMetric;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_name: String,
    #[serde(default = "default_storage_version")]
    pub version: u32,
}

const fn default_storage_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimensions: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub index_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub quantized: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

const fn default_true() -> bool {
    true
}
const fn default_max_retries() -> u32 {
    3
}
const fn default_retry_delay_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_cache_bytes")]
    pub cache_bytes: usize,
    #[serde(default = "default_embedding_cache_entries")]
    pub embedding_cache_entries: usize,
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: usize,
    #[serde(default = "default_batch_flush_ms")]
    pub batch_flush_ms: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub lazy_load_models: bool,
}

const fn default_cache_bytes() -> usize {
    64 * 1024 * 1024
}
const fn default_embedding_cache_entries() -> usize {
    10_000
}
const fn default_batch_max_size() -> usize {
    100
}
const fn default_batch_flush_ms() -> u64 {
    50
}
const fn default_chunk_size() -> usize {
    100
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_bytes: default_cache_bytes(),
            embedding_cache_entries: default_embedding_cache_entries(),
            batch_max_size: default_batch_max_size(),
            batch_flush_ms: default_batch_flush_ms(),
            chunk_size: default_chunk_size(),
            lazy_load_models: false,
        }
    }
}

/// Top-level configuration a host passes to `VectorDb::new`/`open`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl VectorDbConfig {
    /// Validate the subset of fields the specification calls out for
    /// `InvalidConfig`: missing dbName, non-positive dimensions, missing
    /// embedding model.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a human-readable reason when validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.db_name.trim().is_empty() {
            return Err("storage.dbName must not be empty".to_string());
        }
        if self.index.dimensions == 0 {
            return Err("index.dimensions must be positive".to_string());
        }
        if self.embedding.model.trim().is_empty() {
            return Err("embedding.model must not be empty".to_string());
        }
        Ok(())
    }
}

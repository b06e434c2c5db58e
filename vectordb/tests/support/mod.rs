//! Shared fixtures for the integration test suites.

use std::sync::Arc;
use vectordb::{DistanceMetric, EmbeddingConfig, IndexConfig, PerformanceConfig, StorageConfig, VectorDb, VectorDbConfig};
use vectordb_core::testing::MockEmbeddingGenerator;
use vectordb_index::HnswIndex;
use vectordb_storage::MemoryStorage;

pub const DIMENSIONS: usize = 8;

#[must_use]
pub fn test_config(db_name: &str) -> VectorDbConfig {
    VectorDbConfig {
        storage: StorageConfig {
            db_name: db_name.to_string(),
            version: 1,
        },
        index: IndexConfig {
            dimensions: DIMENSIONS,
            metric: DistanceMetric::Cosine,
            index_type: None,
        },
        embedding: EmbeddingConfig {
            model: "mock-embedding".to_string(),
            device: None,
            cache: true,
            quantized: false,
            max_retries: 2,
            retry_delay_ms: 1,
        },
        performance: PerformanceConfig {
            batch_flush_ms: 5,
            ..PerformanceConfig::default()
        },
    }
}

/// Build and initialize a `VectorDb` wired to in-memory fakes, ready for
/// immediate use in a test.
pub async fn build_db(db_name: &str) -> VectorDb {
    let config = test_config(db_name);
    let storage = Arc::new(MemoryStorage::new());
    let index = Arc::new(HnswIndex::new(DIMENSIONS, DistanceMetric::Cosine));
    let embedding = Arc::new(MockEmbeddingGenerator::new(DIMENSIONS));

    let db = VectorDb::new(config, storage, index, embedding).expect("valid config");
    db.initialize().await.expect("initialize succeeds");
    db
}

//! Durability across a restart: a fresh `VectorDb` opened on the same
//! `sled` path picks up everything a prior instance wrote.

mod support;

use std::sync::Arc;
use support::{test_config, DIMENSIONS};
use vectordb::{DistanceMetric, InsertInput, SearchQuery, VectorDb};
use vectordb_core::testing::MockEmbeddingGenerator;
use vectordb_index::HnswIndex;
use vectordb_storage::SledStorage;

#[tokio::test]
async fn records_survive_a_fresh_vectordb_over_the_same_sled_path() {
    let dir = tempfile::tempdir().expect("tempdir");

    let id = {
        let storage = Arc::new(SledStorage::open(dir.path()).await.expect("open sled"));
        let index = Arc::new(HnswIndex::new(DIMENSIONS, DistanceMetric::Cosine));
        let embedding = Arc::new(MockEmbeddingGenerator::new(DIMENSIONS));
        let db = VectorDb::new(test_config("durability"), storage, index, embedding).unwrap();
        db.initialize().await.unwrap();

        let id = db
            .insert(InsertInput {
                vector: Some(vec![1.0; DIMENSIONS]),
                ..Default::default()
            })
            .await
            .unwrap();
        db.dispose().await.unwrap();
        id
    };

    let storage = Arc::new(SledStorage::open(dir.path()).await.expect("reopen sled"));
    let index = Arc::new(HnswIndex::new(DIMENSIONS, DistanceMetric::Cosine));
    let embedding = Arc::new(MockEmbeddingGenerator::new(DIMENSIONS));
    let reopened = VectorDb::new(test_config("durability"), storage, index, embedding).unwrap();
    reopened.initialize().await.unwrap();

    assert_eq!(reopened.size().await.unwrap(), 1);
    let hits = reopened
        .search(SearchQuery {
            vector: Some(vec![1.0; DIMENSIONS]),
            k: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.first().map(|h| &h.id), Some(&id));
}

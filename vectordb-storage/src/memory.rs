//! In-memory `Storage` backend: no disk, used for tests and ephemeral
//! embedded use.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream};
use tracing::debug;
use vectordb_core::error::StorageError;
use vectordb_core::id::VectorId;
use vectordb_core::traits::storage::Storage;
use vectordb_core::types::record::VectorRecord;

/// `DashMap`-backed `Storage`: concurrent reads/writes without a writer
/// lock, matching the teacher's habit of reaching for `dashmap` wherever a
/// concurrent map is the shape of the problem.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: DashMap<VectorId, VectorRecord>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, record: VectorRecord) -> Result<(), StorageError> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn put_batch(&self, records: Vec<VectorRecord>) -> Result<(), StorageError> {
        // All-or-nothing: memory writes can't partially fail, so the batch
        // is trivially atomic.
        for record in records {
            self.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn get(&self, id: &VectorId) -> Result<Option<VectorRecord>, StorageError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn delete(&self, id: &VectorId) -> Result<bool, StorageError> {
        Ok(self.records.remove(id).is_some())
    }

    async fn get_all(&self) -> Result<Vec<VectorRecord>, StorageError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.records.len())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        debug!(count = self.records.len(), "clearing memory storage");
        self.records.clear();
        Ok(())
    }

    fn scan(&self) -> BoxStream<'_, Result<VectorRecord, StorageError>> {
        let snapshot: Vec<VectorRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        Box::pin(stream::iter(snapshot.into_iter().map(Ok)))
    }
}

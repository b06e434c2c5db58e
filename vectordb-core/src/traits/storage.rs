//! Durable keyed persistence of vector records.

use crate::error::StorageError;
use crate::id::VectorId;
use crate::types::record::VectorRecord;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Durable keyed store for [`VectorRecord`]s, pluggable per specification §4.1.
///
/// Implementations (`vectordb-storage::MemoryStorage`,
/// `vectordb-storage::SledStorage`) are capabilities: the coordinator holds
/// one behind `Arc<dyn Storage>` and never depends on a concrete backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Idempotent upsert of a single record.
    async fn put(&self, record: VectorRecord) -> Result<(), StorageError>;

    /// Atomic upsert of a batch: all records land or none do.
    async fn put_batch(&self, records: Vec<VectorRecord>) -> Result<(), StorageError>;

    async fn get(&self, id: &VectorId) -> Result<Option<VectorRecord>, StorageError>;

    /// Returns whether the record existed prior to deletion.
    async fn delete(&self, id: &VectorId) -> Result<bool, StorageError>;

    /// Materializes every record. Prefer [`Storage::scan`] for large sets.
    async fn get_all(&self) -> Result<Vec<VectorRecord>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    /// Cursor-driven traversal as a stream, so the caller (e.g.
    /// `vectordb_storage::ProgressiveLoader`) drives iteration and can await
    /// between items without the full set ever living in memory at once.
    fn scan(&self) -> BoxStream<'_, Result<VectorRecord, StorageError>>;
}

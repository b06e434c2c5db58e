//! Streaming scan and chunked import, specification §4.6.
//!
//! Receives `Storage` as an argument rather than holding a reference to it
//! (specification §9, "no cyclic ownership": subsystems never hold
//! back-references).

use futures::StreamExt;
use std::future::Future;
use tracing::debug;
use vectordb_core::error::StorageError;
use vectordb_core::traits::storage::Storage;
use vectordb_core::types::record::VectorRecord;

/// Default chunk size for [`ProgressiveLoader::import_in_batches`] when the
/// caller doesn't override it.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Stateless helper driving `Storage::scan` and chunked imports. Holds no
/// state of its own; every call takes the `Storage` it operates on.
#[derive(Debug, Default)]
pub struct ProgressiveLoader;

impl ProgressiveLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Drive `storage.scan()` and call `visit(record)` per item, awaiting
    /// the visitor between items so back-pressure propagates to the
    /// underlying scan. The outer stream — not an inner accumulator — is
    /// what yields, so every item is delivered even under backpressure.
    ///
    /// # Errors
    ///
    /// Propagates the first [`StorageError`] encountered during the scan.
    pub async fn stream_process<S, F, Fut>(
        &self,
        storage: &S,
        mut visit: F,
    ) -> Result<usize, StorageError>
    where
        S: Storage + ?Sized,
        F: FnMut(VectorRecord) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut stream = storage.scan();
        let mut processed = 0usize;
        while let Some(item) = stream.next().await {
            let record = item?;
            visit(record).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Chunk `records` by `chunk_size` (default [`DEFAULT_CHUNK_SIZE`]),
    /// `put_batch` each chunk, and report `(loaded, total)` after every
    /// chunk and once more at completion.
    ///
    /// # Errors
    ///
    /// Propagates the first [`StorageError`] a chunk's `put_batch` raises;
    /// prior chunks remain durable (atomicity is per-chunk, not across the
    /// whole import).
    pub async fn import_in_batches<S, F>(
        &self,
        storage: &S,
        records: Vec<VectorRecord>,
        chunk_size: Option<usize>,
        mut on_progress: F,
    ) -> Result<(), StorageError>
    where
        S: Storage + ?Sized,
        F: FnMut(usize, usize),
    {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let total = records.len();
        let mut loaded = 0usize;

        for chunk in records.into_iter().collect::<Vec<_>>().chunks(chunk_size) {
            storage.put_batch(chunk.to_vec()).await?;
            loaded += chunk.len();
            debug!(loaded, total, "imported chunk");
            on_progress(loaded, total);
        }
        if total == 0 {
            on_progress(0, 0);
        }
        Ok(())
    }
}

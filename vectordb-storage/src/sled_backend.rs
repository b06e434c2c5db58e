//! Durable `Storage` backend over `sled`.
//!
//! `sled`'s API is synchronous; every operation here is dispatched through
//! `tokio::task::spawn_blocking` so the coordinator's async call sites stay
//! non-blocking even though the underlying engine is not.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use vectordb_core::error::StorageError;
use vectordb_core::id::VectorId;
use vectordb_core::traits::storage::Storage;
use vectordb_core::types::record::VectorRecord;

/// Durable, crash-safe `Storage` backend.
#[derive(Clone)]
pub struct SledStorage {
    db: Arc<sled::Db>,
}

impl std::fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStorage").finish_non_exhaustive()
    }
}

impl SledStorage {
    /// Open (or create) a sled database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the backing store cannot be
    /// opened.
    #[instrument(skip(path))]
    pub async fn open(path: impl AsRef<Path> + Send) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || sled::open(path))
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("sled open task panicked: {e}"),
            })?
            .map_err(|e| StorageError::Unavailable {
                message: format!("failed to open sled database: {e}"),
            })?;
        Ok(Self { db: Arc::new(db) })
    }

    fn encode(record: &VectorRecord) -> Result<Vec<u8>, StorageError> {
        rmp_serde::to_vec(record).map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })
    }

    fn decode(bytes: &[u8]) -> Result<VectorRecord, StorageError> {
        rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Storage for SledStorage {
    async fn put(&self, record: VectorRecord) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = record.id.as_str().to_string();
        let value = Self::encode(&record)?;
        tokio::task::spawn_blocking(move || db.insert(key.as_bytes(), value))
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("sled put task panicked: {e}"),
            })?
            .map_err(|e| StorageError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn put_batch(&self, records: Vec<VectorRecord>) -> Result<(), StorageError> {
        let db = self.db.clone();
        let mut encoded = Vec::with_capacity(records.len());
        for record in &records {
            encoded.push((record.id.as_str().to_string(), Self::encode(record)?));
        }
        tokio::task::spawn_blocking(move || {
            let mut batch = sled::Batch::default();
            for (key, value) in encoded {
                batch.insert(key.as_bytes(), value);
            }
            db.apply_batch(batch)
        })
        .await
        .map_err(|e| StorageError::Unavailable {
            message: format!("sled put_batch task panicked: {e}"),
        })?
        .map_err(|e| StorageError::Unavailable {
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn get(&self, id: &VectorId) -> Result<Option<VectorRecord>, StorageError> {
        let db = self.db.clone();
        let key = id.as_str().to_string();
        let bytes = tokio::task::spawn_blocking(move || db.get(key.as_bytes()))
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("sled get task panicked: {e}"),
            })?
            .map_err(|e| StorageError::Unavailable {
                message: e.to_string(),
            })?;
        bytes.map(|ivec| Self::decode(&ivec)).transpose()
    }

    async fn delete(&self, id: &VectorId) -> Result<bool, StorageError> {
        let db = self.db.clone();
        let key = id.as_str().to_string();
        let prior = tokio::task::spawn_blocking(move || db.remove(key.as_bytes()))
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("sled delete task panicked: {e}"),
            })?
            .map_err(|e| StorageError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(prior.is_some())
    }

    async fn get_all(&self) -> Result<Vec<VectorRecord>, StorageError> {
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || {
            db.iter()
                .values()
                .collect::<Result<Vec<_>, sled::Error>>()
        })
        .await
        .map_err(|e| StorageError::Unavailable {
            message: format!("sled get_all task panicked: {e}"),
        })?
        .map_err(|e| StorageError::Unavailable {
            message: e.to_string(),
        })?;
        rows.iter().map(|v| Self::decode(v)).collect()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || db.len())
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("sled count task panicked: {e}"),
            })?)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let db = self.db.clone();
        let count = self.count().await.unwrap_or(0);
        debug!(count, "clearing sled storage");
        tokio::task::spawn_blocking(move || db.clear())
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("sled clear task panicked: {e}"),
            })?
            .map_err(|e| StorageError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn scan(&self) -> BoxStream<'_, Result<VectorRecord, StorageError>> {
        // sled's iterator is blocking; materialize values via spawn_blocking
        // in fixed-size pages so a full scan never pins the whole dataset
        // in memory, then flatten pages into a single record stream.
        const PAGE_SIZE: usize = 256;
        let db = self.db.clone();

        let pages = stream::unfold(
            (db, Some(Vec::<u8>::new()), true),
            move |(db, cursor, first)| async move {
                let Some(cursor_key) = cursor else {
                    return None;
                };
                let db2 = db.clone();
                let page = tokio::task::spawn_blocking(move || {
                    let iter = if first {
                        db2.iter()
                    } else {
                        db2.range(cursor_key.clone()..)
                    };
                    let mut rows = Vec::with_capacity(PAGE_SIZE);
                    let mut next_cursor = None;
                    for entry in iter {
                        match entry {
                            Ok((k, v)) => {
                                if !first && k.as_ref() == cursor_key.as_slice() {
                                    continue;
                                }
                                rows.push(v);
                                if rows.len() >= PAGE_SIZE {
                                    next_cursor = Some(k.to_vec());
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "sled scan page failed");
                                break;
                            }
                        }
                    }
                    (rows, next_cursor)
                })
                .await
                .unwrap_or((Vec::new(), None));

                let (rows, next_cursor) = page;
                if rows.is_empty() {
                    None
                } else {
                    Some((rows, (db, next_cursor, false)))
                }
            },
        );

        Box::pin(
            pages
                .flat_map(|rows| stream::iter(rows.into_iter().map(|v| Self::decode(&v))))
                .boxed(),
        )
    }
}

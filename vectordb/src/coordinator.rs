//! The `VectorDb` façade: lifecycle, validation, and write ordering across
//! Storage, the AnnIndex, the tiered caches, and the BatchCoalescer.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use vectordb_cache::{EmbeddingCache, EmbeddingCacheConfig, VectorCache};
use vectordb_coalescer::{BatchCoalescer, CoalescerConfig};
use vectordb_core::error::{Result, StorageError, VectorDbError};
use vectordb_core::id::VectorId;
use vectordb_core::traits::{AnnIndex, EmbeddingGenerator, Storage};
use vectordb_core::types::config::VectorDbConfig;
use vectordb_core::types::envelope::{EnvelopeVersion, ExportEnvelope, ExportMetadata, CURRENT_VERSION};
use vectordb_core::types::record::{SearchHit, VectorRecord};
use vectordb_storage::ProgressiveLoader;

use crate::types::{ExportChunk, ExportOptions, ImportOptions, InsertInput, SearchQuery, UpdateInput};

/// Coordinates the durable store, the ANN index, the tiered caches, and the
/// write-batch coalescer behind a single façade. Exactly one mutating call
/// may be in flight at a time per instance (specification §5); concurrent
/// reads are always safe.
pub struct VectorDb {
    config: VectorDbConfig,
    storage: Arc<dyn Storage>,
    index: Arc<dyn AnnIndex>,
    embedding: Arc<dyn EmbeddingGenerator>,
    vector_cache: VectorCache,
    embedding_cache: EmbeddingCache,
    coalescer: Arc<BatchCoalescer>,
    initialized: AtomicBool,
    embedding_ready: AtomicBool,
    write_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for VectorDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDb")
            .field("config", &self.config)
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl VectorDb {
    /// Build a `VectorDb` over the given capability implementations.
    ///
    /// # Errors
    ///
    /// Returns [`VectorDbError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: VectorDbConfig,
        storage: Arc<dyn Storage>,
        index: Arc<dyn AnnIndex>,
        embedding: Arc<dyn EmbeddingGenerator>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|message| VectorDbError::InvalidConfig { message })?;

        let coalescer = BatchCoalescer::new(
            storage.clone(),
            CoalescerConfig {
                max_batch_size: config.performance.batch_max_size,
                flush_interval_ms: config.performance.batch_flush_ms,
            },
        );
        let vector_cache = VectorCache::new(config.performance.cache_bytes);
        let embedding_cache = EmbeddingCache::new(EmbeddingCacheConfig {
            max_entries: config.performance.embedding_cache_entries,
            ttl: None,
        });

        Ok(Self {
            config,
            storage,
            index,
            embedding,
            vector_cache,
            embedding_cache,
            coalescer,
            initialized: AtomicBool::new(false),
            embedding_ready: AtomicBool::new(false),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Open the database: loads the index from storage if non-empty, and
    /// (unless `performance.lazyLoadModels`) loads and validates the
    /// embedding model. Idempotent. On any failure, disposes what was
    /// acquired and surfaces [`VectorDbError::InitError`].
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        match self.initialize_inner().await {
            Ok(()) => {
                self.initialized.store(true, Ordering::SeqCst);
                info!("vector database initialized");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "initialize failed, cleaning up");
                self.embedding.dispose().await;
                self.vector_cache.clear();
                self.embedding_cache.clear();
                Err(VectorDbError::InitError {
                    message: err.to_string(),
                })
            }
        }
    }

    async fn initialize_inner(&self) -> Result<()> {
        if !self.config.performance.lazy_load_models {
            self.load_embedding_model().await?;
        }

        let count = self.storage.count().await?;
        if count > 0 {
            let all = self.storage.get_all().await?;
            self.index.build(all).await?;
        }
        Ok(())
    }

    /// Load the embedding model with exponential-backoff retry
    /// (`retryDelay · 2^attempt`, up to `maxRetries`), then verify its
    /// reported dimensionality matches the configured `D`.
    async fn load_embedding_model(&self) -> Result<()> {
        let max_retries = self.config.embedding.max_retries;
        let base_delay_ms = self.config.embedding.retry_delay_ms;
        let mut attempt = 0u32;

        loop {
            match self.embedding.initialize().await {
                Ok(()) => break,
                Err(err) if attempt < max_retries => {
                    let delay_ms = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
                    warn!(attempt, delay_ms, error = %err, "embedding model load failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(VectorDbError::ModelLoadError {
                        message: err.to_string(),
                    })
                }
            }
        }

        let actual = self.embedding.dimensions();
        if actual != self.config.index.dimensions {
            return Err(VectorDbError::DimensionMismatch {
                expected: self.config.index.dimensions,
                actual,
            });
        }
        self.embedding_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VectorDbError::NotInitialized {
                message: "call initialize() before use".to_string(),
            })
        }
    }

    /// Lazily load the embedding model on first text operation, when
    /// `performance.lazyLoadModels` is set.
    async fn ensure_embedding_ready(&self) -> Result<()> {
        if self.embedding_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.load_embedding_model().await
    }

    async fn embed_with_cache(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.embedding_cache.get(text) {
            return Ok(cached);
        }
        self.ensure_embedding_ready().await?;
        let vector = self.embedding.embed(text).await?;
        self.embedding_cache.put(text.to_string(), vector.clone());
        Ok(vector)
    }

    async fn resolve_vector(
        &self,
        vector: Option<Vec<f32>>,
        text: Option<&str>,
        missing: impl FnOnce(String) -> VectorDbError,
    ) -> Result<Vec<f32>> {
        if let Some(vector) = vector {
            return Ok(vector);
        }
        if let Some(text) = text {
            return self.embed_with_cache(text).await;
        }
        Err(missing(
            "either `vector` or `text` must be provided".to_string(),
        ))
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.index.dimensions {
            return Err(VectorDbError::DimensionMismatch {
                expected: self.config.index.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert one record. The index and cache are updated before the write
    /// is handed to the coalescer, so a `search` launched after this call
    /// resolves always observes the insertion (specification §5, ordering
    /// guarantee 2 and 4) even though the durable write to Storage may
    /// still be pending inside the coalescer's batch.
    ///
    /// # Errors
    ///
    /// Returns [`VectorDbError::InvalidInsertData`] if neither `vector` nor
    /// `text` is supplied, [`VectorDbError::DimensionMismatch`] if the
    /// resolved vector's length differs from `D`, or a storage/index error.
    #[instrument(skip(self, data))]
    pub async fn insert(&self, data: InsertInput) -> Result<VectorId> {
        self.ensure_initialized()?;
        let _guard = self.write_lock.lock().await;

        let metadata = sanitize_metadata(data.metadata);
        let vector = self
            .resolve_vector(data.vector, data.text.as_deref(), |message| {
                VectorDbError::InvalidInsertData { message }
            })
            .await?;
        self.check_dimensions(&vector)?;

        let id = VectorId::generate();
        let record = VectorRecord::new(id.clone(), vector, metadata);

        self.index.add(record.clone()).await?;
        self.vector_cache
            .set(id.clone(), record.clone(), record.estimated_size_bytes());
        self.coalescer.put(record).await.map_err(VectorDbError::from)?;

        Ok(id)
    }

    /// Insert many records in one round trip: a single `putBatch` to
    /// Storage bypassing the coalescer (the batch is already the unit of
    /// work the coalescer would itself produce), a single `addBatch` to
    /// the index, then a per-item cache fill.
    ///
    /// # Errors
    ///
    /// Same as [`VectorDb::insert`], evaluated per item before any storage
    /// write is attempted.
    #[instrument(skip(self, data))]
    pub async fn insert_batch(&self, data: Vec<InsertInput>) -> Result<Vec<VectorId>> {
        self.ensure_initialized()?;
        let _guard = self.write_lock.lock().await;

        let mut records = Vec::with_capacity(data.len());
        for item in data {
            let metadata = sanitize_metadata(item.metadata);
            let vector = self
                .resolve_vector(item.vector, item.text.as_deref(), |message| {
                    VectorDbError::InvalidInsertData { message }
                })
                .await?;
            self.check_dimensions(&vector)?;
            records.push(VectorRecord::new(VectorId::generate(), vector, metadata));
        }

        self.storage.put_batch(records.clone()).await?;
        self.index.add_batch(records.clone()).await?;

        let ids = records.iter().map(|r| r.id.clone()).collect();
        for record in records {
            self.vector_cache
                .set(record.id.clone(), record.clone(), record.estimated_size_bytes());
        }
        Ok(ids)
    }

    /// Resolve a query vector (direct, or via text embedding) and search
    /// the index, optionally hydrating each hit's full vector via the
    /// cache and, on a miss, Storage.
    ///
    /// # Errors
    ///
    /// Returns [`VectorDbError::InvalidQuery`] if neither `vector` nor
    /// `text` is supplied, [`VectorDbError::DimensionMismatch`] if the
    /// resolved vector's length differs from `D`, or an index error.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>> {
        self.ensure_initialized()?;

        let vector = self
            .resolve_vector(query.vector, query.text.as_deref(), |message| {
                VectorDbError::InvalidQuery { message }
            })
            .await?;
        self.check_dimensions(&vector)?;

        let mut hits = self
            .index
            .search(&vector, query.k, query.filter.as_ref())
            .await?;

        if query.hydrate_vectors {
            for hit in &mut hits {
                if hit.vector.is_some() {
                    continue;
                }
                if let Some(cached) = self.vector_cache.get(&hit.id) {
                    hit.vector = Some(cached.vector);
                    continue;
                }
                if let Some(record) = self.storage.get(&hit.id).await? {
                    self.vector_cache
                        .set(hit.id.clone(), record.clone(), record.estimated_size_bytes());
                    hit.vector = Some(record.vector);
                }
            }
        }

        Ok(hits)
    }

    /// Delete by id. Cache and index entries are removed only once the
    /// coalesced deletion is durable, and only if the id existed.
    ///
    /// # Errors
    ///
    /// Propagates the coalescer's or index's underlying error.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: VectorId) -> Result<bool> {
        self.ensure_initialized()?;
        let _guard = self.write_lock.lock().await;

        let existed = self
            .coalescer
            .delete(id.clone())
            .await
            .map_err(VectorDbError::from)?;
        if existed {
            self.vector_cache.delete(&id);
            self.index.remove(&id).await?;
        }
        Ok(existed)
    }

    /// Read-modify-write an existing record, bypassing the coalescer so
    /// the write is durable before this call returns (preserving
    /// read-your-writes for updates, specification §9). Returns `false` if
    /// `id` is absent rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`VectorDbError::DimensionMismatch`] if a replacement
    /// vector's length differs from `D`, or a storage/index error.
    #[instrument(skip(self, partial))]
    pub async fn update(&self, id: VectorId, partial: UpdateInput) -> Result<bool> {
        self.ensure_initialized()?;
        let _guard = self.write_lock.lock().await;

        let Some(existing) = self.storage.get(&id).await? else {
            return Ok(false);
        };

        let mut metadata = existing.metadata.clone();
        if let Some(incoming) = partial.metadata {
            metadata.extend(sanitize_metadata(incoming));
        }

        let vector = if partial.vector.is_some() || partial.text.is_some() {
            self.resolve_vector(partial.vector, partial.text.as_deref(), |message| {
                VectorDbError::InvalidInsertData { message }
            })
            .await?
        } else {
            existing.vector
        };
        self.check_dimensions(&vector)?;

        let updated = VectorRecord::new(id.clone(), vector, metadata);
        self.storage.put(updated.clone()).await?;
        self.index.remove(&id).await?;
        self.index.add(updated.clone()).await?;
        self.vector_cache
            .set(id, updated.clone(), updated.estimated_size_bytes());

        Ok(true)
    }

    /// Flush the coalescer, then clear Storage, the index, and both
    /// caches.
    ///
    /// # Errors
    ///
    /// Propagates any storage or index error encountered while clearing.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.ensure_initialized()?;
        let _guard = self.write_lock.lock().await;

        self.coalescer.flush().await.map_err(VectorDbError::from)?;
        self.storage.clear().await?;
        self.index.build(Vec::new()).await?;
        self.vector_cache.clear();
        self.embedding_cache.clear();
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates the underlying storage error.
    pub async fn size(&self) -> Result<usize> {
        self.ensure_initialized()?;
        Ok(self.storage.count().await?)
    }

    /// Rebuild the index from Storage's current contents, discarding
    /// whatever the index previously held.
    #[instrument(skip(self))]
    async fn rebuild_index(&self) -> Result<()> {
        let started = std::time::Instant::now();
        let all = self.storage.get_all().await?;
        let count = all.len();
        self.index.build(all).await?;
        info!(
            vector_count = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt ann index from storage"
        );
        Ok(())
    }

    /// Flush the coalescer, then materialize the whole database as a
    /// single [`ExportEnvelope`].
    ///
    /// # Errors
    ///
    /// Propagates storage or index errors encountered while assembling the
    /// envelope.
    #[instrument(skip(self))]
    pub async fn export(&self, opts: ExportOptions) -> Result<ExportEnvelope> {
        self.ensure_initialized()?;
        self.coalescer.flush().await.map_err(VectorDbError::from)?;

        let vectors = self.storage.get_all().await?;
        let index = if opts.include_index {
            encode_index(self.index.serialize().await?)
        } else {
            String::new()
        };

        Ok(ExportEnvelope {
            version: CURRENT_VERSION.to_string(),
            config: self.config.clone(),
            metadata: ExportMetadata {
                exported_at: chrono::Utc::now().timestamp_millis(),
                vector_count: vectors.len(),
                dimensions: self.config.index.dimensions,
            },
            vectors,
            index,
        })
    }

    /// Streamed export: flushes the coalescer, then drives `Storage::scan`
    /// from an outer unfold so every full chunk of `chunkSize` records is
    /// yielded as it fills — not accumulated and emitted only at the end.
    /// Chunk order follows the envelope layout: metadata, then vector
    /// chunks, then the optional index blob.
    ///
    /// # Errors
    ///
    /// Propagates storage or index errors; a mid-scan storage error
    /// surfaces as an item in the returned stream rather than failing the
    /// call that creates it.
    #[instrument(skip(self))]
    pub async fn export_stream(
        &self,
        opts: ExportOptions,
    ) -> Result<BoxStream<'_, Result<ExportChunk>>> {
        self.ensure_initialized()?;
        self.coalescer.flush().await.map_err(VectorDbError::from)?;

        let dimensions = self.config.index.dimensions;
        let vector_count = self.storage.count().await?;
        let exported_at = chrono::Utc::now().timestamp_millis();
        let chunk_size = opts
            .chunk_size
            .unwrap_or(self.config.performance.chunk_size)
            .max(1);

        let index_blob = if opts.include_index {
            encode_index(self.index.serialize().await?)
        } else {
            String::new()
        };

        let metadata_chunk = stream::once(async move {
            Ok(ExportChunk::Metadata {
                exported_at,
                vector_count,
                dimensions,
            })
        });
        let vector_chunks = chunk_scan(self.storage.scan(), chunk_size);
        let index_chunk = stream::once(async move { Ok(ExportChunk::Index(index_blob)) });

        let chained: BoxStream<'_, Result<ExportChunk>> =
            Box::pin(metadata_chunk.chain(vector_chunks).chain(index_chunk));
        Ok(chained)
    }

    /// Validate `envelope` against the configured dimensionality and the
    /// version-compatibility rule (major must match; a greater minor is
    /// accepted with a warning), optionally clear existing data, bulk-load
    /// the vectors through the `ProgressiveLoader`, then restore the index
    /// — falling back to a full rebuild if the serialized index is absent
    /// or fails to deserialize.
    ///
    /// # Errors
    ///
    /// Returns [`VectorDbError::InvalidExportData`] for a malformed
    /// envelope, [`VectorDbError::VersionIncompatible`] on a major-version
    /// mismatch, or [`VectorDbError::DimensionMismatch`] if the envelope's
    /// dimensionality (or any record's vector length) differs from `D`.
    #[instrument(skip(self, envelope))]
    pub async fn import(&self, envelope: ExportEnvelope, opts: ImportOptions) -> Result<usize> {
        self.ensure_initialized()?;
        let _guard = self.write_lock.lock().await;

        let found = EnvelopeVersion::parse(&envelope.version)
            .map_err(|message| VectorDbError::InvalidExportData { message })?;
        let current = EnvelopeVersion::parse(CURRENT_VERSION)
            .expect("CURRENT_VERSION is always valid semver");
        if found.major != current.major {
            return Err(VectorDbError::VersionIncompatible {
                found: envelope.version.clone(),
                current: CURRENT_VERSION.to_string(),
            });
        }
        if found.minor > current.minor {
            warn!(
                found = %envelope.version,
                current = CURRENT_VERSION,
                "importing an envelope from a newer minor version"
            );
        }

        if envelope.metadata.dimensions != self.config.index.dimensions {
            return Err(VectorDbError::DimensionMismatch {
                expected: self.config.index.dimensions,
                actual: envelope.metadata.dimensions,
            });
        }
        if envelope.vectors.len() != envelope.metadata.vector_count {
            return Err(VectorDbError::InvalidExportData {
                message: format!(
                    "vectors.len() ({}) does not match metadata.vectorCount ({})",
                    envelope.vectors.len(),
                    envelope.metadata.vector_count
                ),
            });
        }
        for record in &envelope.vectors {
            self.check_dimensions(&record.vector)?;
        }

        if opts.clear_existing {
            self.coalescer.flush().await.map_err(VectorDbError::from)?;
            self.storage.clear().await?;
            self.vector_cache.clear();
        }

        let vector_count = envelope.vectors.len();
        let loader = ProgressiveLoader::new();
        loader
            .import_in_batches(
                self.storage.as_ref(),
                envelope.vectors,
                Some(self.config.performance.chunk_size),
                |_loaded, _total| {},
            )
            .await?;

        if envelope.index.is_empty() {
            self.rebuild_index().await?;
        } else {
            match decode_index(&envelope.index) {
                Ok(bytes) => {
                    if let Err(err) = self.index.deserialize(&bytes).await {
                        warn!(error = %err, "serialized index failed to deserialize, rebuilding");
                        self.rebuild_index().await?;
                    }
                }
                Err(message) => {
                    warn!(error = %message, "serialized index was not valid base64, rebuilding");
                    self.rebuild_index().await?;
                }
            }
        }

        Ok(vector_count)
    }

    /// Flush the coalescer, release the embedding generator, and clear
    /// both caches. Storage and the index are owned via `Arc` and
    /// released once this `VectorDb` (and any other holders) drops.
    ///
    /// # Errors
    ///
    /// Propagates a failing final flush.
    #[instrument(skip(self))]
    pub async fn dispose(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.coalescer.flush().await.map_err(VectorDbError::from)?;
        self.embedding.dispose().await;
        self.vector_cache.clear();
        self.embedding_cache.clear();
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn sanitize_metadata(mut metadata: HashMap<String, Value>) -> HashMap<String, Value> {
    // `timestamp` is a first-class VectorRecord field; strip any
    // caller-supplied duplicate so the two can never disagree.
    metadata.remove("timestamp");
    metadata
}

fn encode_index(bytes: Vec<u8>) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

fn decode_index(blob: &str) -> std::result::Result<Vec<u8>, String> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, blob).map_err(|e| e.to_string())
}

/// Drive `scan` from this outer unfold so every full chunk of `chunk_size`
/// records is yielded as soon as it fills, rather than buffering into a
/// visitor closure that can only emit once at the very end.
fn chunk_scan(
    scan: BoxStream<'_, std::result::Result<VectorRecord, StorageError>>,
    chunk_size: usize,
) -> impl Stream<Item = Result<ExportChunk>> + '_ {
    stream::unfold(
        (scan, Vec::<VectorRecord>::with_capacity(chunk_size)),
        move |(mut inner, mut buf)| async move {
            loop {
                match inner.next().await {
                    Some(Ok(record)) => {
                        buf.push(record);
                        if buf.len() >= chunk_size {
                            let chunk = std::mem::replace(&mut buf, Vec::with_capacity(chunk_size));
                            return Some((Ok(ExportChunk::Vectors(chunk)), (inner, buf)));
                        }
                    }
                    Some(Err(err)) => {
                        return Some((Err(VectorDbError::from(err)), (inner, buf)));
                    }
                    None => {
                        if buf.is_empty() {
                            return None;
                        }
                        let chunk = std::mem::take(&mut buf);
                        return Some((Ok(ExportChunk::Vectors(chunk)), (inner, buf)));
                    }
                }
            }
        },
    )
}

//! `AnnIndex` backed by `hnsw_rs`, tagged by metric since `Hnsw` is
//! monomorphized over its `Distance` implementation and the metric is a
//! runtime configuration choice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, instrument, warn};
use vectordb_core::error::IndexError;
use vectordb_core::id::VectorId;
use vectordb_core::traits::index::{AnnIndex, IndexStats};
use vectordb_core::types::record::{DistanceMetric, QueryFilter, SearchHit, VectorRecord};

/// HNSW construction/search parameters. Presets mirror the speed/accuracy
/// tradeoffs conventional for this algorithm.
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub max_nb_connection: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layers: usize,
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 100,
            max_layers: 16,
            max_elements: 1_000_000,
        }
    }
}

/// Internal id bookkeeping plus metadata kept alongside the HNSW graph so
/// filters can be evaluated without a storage round-trip.
struct LiveEntry {
    vector: Vec<f32>,
    metadata: HashMap<String, serde_json::Value>,
}

enum Graph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    L2(Hnsw<'static, f32, DistL2>),
    Dot(Hnsw<'static, f32, DistDot>),
}

impl Graph {
    fn new(metric: DistanceMetric, params: HnswParams) -> Self {
        match metric {
            DistanceMetric::Cosine => Self::Cosine(Hnsw::new(
                params.max_nb_connection,
                params.max_elements,
                params.max_layers,
                params.ef_construction,
                DistCosine {},
            )),
            DistanceMetric::L2 => Self::L2(Hnsw::new(
                params.max_nb_connection,
                params.max_elements,
                params.max_layers,
                params.ef_construction,
                DistL2 {},
            )),
            DistanceMetric::Dot => Self::Dot(Hnsw::new(
                params.max_nb_connection,
                params.max_elements,
                params.max_layers,
                params.ef_construction,
                DistDot {},
            )),
        }
    }

    fn insert(&self, vector: &[f32], internal_id: usize) {
        match self {
            Self::Cosine(h) => h.insert((vector, internal_id)),
            Self::L2(h) => h.insert((vector, internal_id)),
            Self::Dot(h) => h.insert((vector, internal_id)),
        }
    }

    /// Raw neighbours as `(internal_id, hnsw_rs distance)` pairs; distance
    /// orientation is converted to the score contract by the caller.
    fn search(&self, query: &[f32], knbn: usize, ef_search: usize) -> Vec<(usize, f32)> {
        match self {
            Self::Cosine(h) => h
                .search(query, knbn, ef_search)
                .into_iter()
                .map(|n| (n.d_id, n.distance))
                .collect(),
            Self::L2(h) => h
                .search(query, knbn, ef_search)
                .into_iter()
                .map(|n| (n.d_id, n.distance))
                .collect(),
            Self::Dot(h) => h
                .search(query, knbn, ef_search)
                .into_iter()
                .map(|n| (n.d_id, n.distance))
                .collect(),
        }
    }
}

/// Opaque on-disk snapshot format for `serialize`/`deserialize`: membership
/// and dimensions, not the raw HNSW graph — rebuilt fresh on load.
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    dimensions: usize,
    metric: DistanceMetric,
    entries: Vec<(String, Vec<f32>, HashMap<String, serde_json::Value>)>,
}

/// Fraction of tombstoned entries (relative to live + tombstoned) that
/// triggers an internal rebuild on the next mutation.
const TOMBSTONE_REBUILD_RATIO: f64 = 0.25;
/// How much to over-fetch from the graph when a metadata filter is present,
/// to compensate for candidates the filter will reject.
const FILTER_OVERFETCH_MULTIPLIER: usize = 8;

pub struct HnswIndex {
    dimensions: usize,
    metric: DistanceMetric,
    params: HnswParams,
    graph: RwLock<Graph>,
    entries: DashMap<usize, LiveEntry>,
    id_to_internal: DashMap<VectorId, usize>,
    internal_to_id: DashMap<usize, VectorId>,
    tombstoned: DashSet<usize>,
    next_internal_id: AtomicUsize,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimensions", &self.dimensions)
            .field("metric", &self.metric)
            .field("vector_count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl HnswIndex {
    #[must_use]
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self::with_params(dimensions, metric, HnswParams::default())
    }

    #[must_use]
    pub fn with_params(dimensions: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        Self {
            dimensions,
            metric,
            params,
            graph: RwLock::new(Graph::new(metric, params)),
            entries: DashMap::new(),
            id_to_internal: DashMap::new(),
            internal_to_id: DashMap::new(),
            tombstoned: DashSet::new(),
            next_internal_id: AtomicUsize::new(0),
            last_updated: RwLock::new(None),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn touch(&self) {
        *self.last_updated.write() = Some(Utc::now());
    }

    fn insert_live(&self, id: VectorId, vector: Vec<f32>, metadata: HashMap<String, serde_json::Value>) {
        let internal_id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        self.graph.read().insert(&vector, internal_id);
        self.entries.insert(internal_id, LiveEntry { vector, metadata });
        self.id_to_internal.insert(id.clone(), internal_id);
        self.internal_to_id.insert(internal_id, id);
    }

    fn tombstone_ratio(&self) -> f64 {
        let live = self.entries.len();
        let dead = self.tombstoned.len();
        if live + dead == 0 {
            0.0
        } else {
            dead as f64 / (live + dead) as f64
        }
    }

    /// Rebuild the HNSW graph from currently-live entries, discarding
    /// tombstones. Internal ids are reassigned starting from zero.
    #[instrument(skip(self))]
    fn rebuild_from_live(&self) {
        let started = std::time::Instant::now();
        let live: Vec<(VectorId, Vec<f32>, HashMap<String, serde_json::Value>)> = self
            .internal_to_id
            .iter()
            .filter(|kv| !self.tombstoned.contains(kv.key()))
            .filter_map(|kv| {
                let internal_id = *kv.key();
                self.entries.get(&internal_id).map(|e| {
                    (kv.value().clone(), e.vector.clone(), e.metadata.clone())
                })
            })
            .collect();

        *self.graph.write() = Graph::new(self.metric, self.params);
        self.entries.clear();
        self.id_to_internal.clear();
        self.internal_to_id.clear();
        self.tombstoned.clear();
        self.next_internal_id.store(0, Ordering::SeqCst);

        let count = live.len();
        for (id, vector, metadata) in live {
            self.insert_live(id, vector, metadata);
        }
        info!(
            vector_count = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt ann index from live entries"
        );
    }

    fn maybe_rebuild(&self) {
        if self.tombstone_ratio() >= TOMBSTONE_REBUILD_RATIO && !self.tombstoned.is_empty() {
            self.rebuild_from_live();
        }
    }

    fn score_from_distance(&self, distance: f32) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::L2 => distance,
            DistanceMetric::Dot => -distance,
        }
    }

    fn rank_ascending(&self) -> bool {
        matches!(self.metric, DistanceMetric::L2)
    }
}

#[async_trait]
impl AnnIndex for HnswIndex {
    #[instrument(skip(self, records))]
    async fn build(&self, records: Vec<VectorRecord>) -> Result<(), IndexError> {
        for record in &records {
            self.check_dimensions(&record.vector)?;
        }

        *self.graph.write() = Graph::new(self.metric, self.params);
        self.entries.clear();
        self.id_to_internal.clear();
        self.internal_to_id.clear();
        self.tombstoned.clear();
        self.next_internal_id.store(0, Ordering::SeqCst);

        let count = records.len();
        for record in records {
            self.insert_live(record.id, record.vector, record.metadata);
        }
        self.touch();
        info!(vector_count = count, "built ann index");
        Ok(())
    }

    async fn add(&self, record: VectorRecord) -> Result<(), IndexError> {
        self.check_dimensions(&record.vector)?;
        self.maybe_rebuild();
        self.insert_live(record.id, record.vector, record.metadata);
        self.touch();
        Ok(())
    }

    async fn add_batch(&self, records: Vec<VectorRecord>) -> Result<(), IndexError> {
        for record in &records {
            self.check_dimensions(&record.vector)?;
        }
        self.maybe_rebuild();
        for record in records {
            self.insert_live(record.id, record.vector, record.metadata);
        }
        self.touch();
        Ok(())
    }

    async fn remove(&self, id: &VectorId) -> Result<(), IndexError> {
        if let Some((_, internal_id)) = self.id_to_internal.remove(id) {
            self.internal_to_id.remove(&internal_id);
            self.entries.remove(&internal_id);
            self.tombstoned.insert(internal_id);
            self.touch();
            self.maybe_rebuild();
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimensions(query)?;
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        // Raw results come from the physical hnsw graph, which still holds
        // tombstoned points until the next rebuild. Scale the request up so
        // enough live candidates survive the tombstone filter below even
        // when the live fraction of the graph is small.
        let live = self.entries.len();
        let tombstoned = self.tombstoned.len();
        let physical = live + tombstoned;
        let requested = if filter.is_some() {
            k * FILTER_OVERFETCH_MULTIPLIER
        } else {
            k
        };
        let knbn = if tombstoned == 0 {
            requested.min(physical)
        } else {
            let live_fraction = (live as f64 / physical as f64).max(0.01);
            let scaled = (requested as f64 / live_fraction).ceil() as usize;
            scaled.min(physical)
        };
        let ef_search = self.params.ef_search.max(knbn);

        let raw = self.graph.read().search(query, knbn, ef_search);

        let mut candidates: Vec<(VectorId, f32, HashMap<String, serde_json::Value>, Vec<f32>)> =
            Vec::with_capacity(raw.len());
        for (internal_id, distance) in raw {
            if self.tombstoned.contains(&internal_id) {
                continue;
            }
            let Some(id) = self.internal_to_id.get(&internal_id) else {
                continue;
            };
            let Some(entry) = self.entries.get(&internal_id) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.matches(&entry.metadata) {
                    continue;
                }
            }
            let score = self.score_from_distance(distance);
            candidates.push((id.clone(), score, entry.metadata.clone(), entry.vector.clone()));
        }

        let ascending = self.rank_ascending();
        candidates.sort_by(|a, b| {
            let ord = if ascending {
                a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            };
            ord.then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|(id, score, metadata, _vector)| SearchHit {
                id,
                score,
                metadata,
                vector: None,
            })
            .collect())
    }

    async fn serialize(&self) -> Result<Vec<u8>, IndexError> {
        let entries = self
            .internal_to_id
            .iter()
            .filter(|kv| !self.tombstoned.contains(kv.key()))
            .filter_map(|kv| {
                self.entries.get(kv.key()).map(|e| {
                    (kv.value().as_str().to_string(), e.vector.clone(), e.metadata.clone())
                })
            })
            .collect();

        let snapshot = IndexSnapshot {
            dimensions: self.dimensions,
            metric: self.metric,
            entries,
        };
        rmp_serde::to_vec(&snapshot).map_err(|e| IndexError::Corrupted {
            message: format!("failed to serialize index snapshot: {e}"),
        })
    }

    async fn deserialize(&self, bytes: &[u8]) -> Result<(), IndexError> {
        let snapshot: IndexSnapshot = rmp_serde::from_slice(bytes).map_err(|e| {
            warn!(error = %e, "index snapshot failed to decode");
            IndexError::Corrupted {
                message: format!("malformed index snapshot: {e}"),
            }
        })?;

        if snapshot.dimensions != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: snapshot.dimensions,
            });
        }

        let records = snapshot
            .entries
            .into_iter()
            .map(|(id, vector, metadata)| {
                VectorRecord::new(VectorId::from_raw(id), vector, metadata)
            })
            .collect();
        self.build(records).await
    }

    async fn stats(&self) -> IndexStats {
        let vector_count = self.entries.len();
        let memory_usage_bytes = vector_count * self.dimensions * std::mem::size_of::<f32>()
            + vector_count * 128;
        IndexStats {
            vector_count,
            dimensions: self.dimensions,
            memory_usage_bytes,
            last_updated: *self.last_updated.read(),
        }
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn record(id: &str, vector: Vec<f32>, metadata: HashMap<String, serde_json::Value>) -> VectorRecord {
        VectorRecord::new(VectorId::from_raw(id), vector, metadata)
    }

    #[tokio::test]
    async fn basic_cosine_search_ranks_exact_match_first() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        index
            .build(vec![
                record("v1", vec![1.0, 0.0, 0.0], meta(&[("cat", json!("A"))])),
                record("v2", vec![0.0, 1.0, 0.0], meta(&[("cat", json!("B"))])),
                record("v3", vec![0.0, 0.0, 1.0], meta(&[("cat", json!("A"))])),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].id, VectorId::from_raw("v1"));
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn filtered_search_excludes_non_matching() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        index
            .build(vec![
                record("v1", vec![1.0, 0.0, 0.0], meta(&[("cat", json!("A"))])),
                record("v2", vec![0.0, 1.0, 0.0], meta(&[("cat", json!("B"))])),
                record("v3", vec![0.0, 0.0, 1.0], meta(&[("cat", json!("A"))])),
            ])
            .await
            .unwrap();

        let filter = QueryFilter::Leaf {
            field: "cat".into(),
            op: vectordb_core::types::record::FilterOp::Eq,
            value: json!("A"),
        };
        let hits = index.search(&[1.0, 0.0, 0.0], 5, Some(&filter)).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![VectorId::from_raw("v1"), VectorId::from_raw("v3")]);
    }

    #[tokio::test]
    async fn remove_excludes_from_subsequent_search() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        index
            .build(vec![
                record("v1", vec![1.0, 0.0, 0.0], HashMap::new()),
                record("v2", vec![0.0, 1.0, 0.0], HashMap::new()),
            ])
            .await
            .unwrap();
        index.remove(&VectorId::from_raw("v1")).await.unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 5, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![VectorId::from_raw("v2")]);
        assert_eq!(index.stats().await.vector_count, 1);
    }

    #[tokio::test]
    async fn remove_of_absent_id_is_noop() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        index.remove(&VectorId::from_raw("ghost")).await.unwrap();
    }

    #[tokio::test]
    async fn add_with_wrong_dimension_fails_and_leaves_state_unchanged() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        index
            .add(record("v1", vec![1.0, 0.0, 0.0], HashMap::new()))
            .await
            .unwrap();

        let err = index
            .add(record("v2", vec![1.0, 0.0], HashMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(index.stats().await.vector_count, 1);
    }

    #[tokio::test]
    async fn serialize_deserialize_round_trip_preserves_search_results() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        index
            .build(vec![
                record("v1", vec![1.0, 0.0, 0.0], meta(&[("cat", json!("A"))])),
                record("v2", vec![0.0, 1.0, 0.0], meta(&[("cat", json!("B"))])),
            ])
            .await
            .unwrap();

        let bytes = index.serialize().await.unwrap();

        let restored = HnswIndex::new(3, DistanceMetric::Cosine);
        restored.deserialize(&bytes).await.unwrap();

        let hits = restored.search(&[1.0, 0.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits[0].id, VectorId::from_raw("v1"));
    }

    #[tokio::test]
    async fn deserialize_rejects_dimension_mismatch() {
        let snapshot = IndexSnapshot {
            dimensions: 5,
            metric: DistanceMetric::Cosine,
            entries: Vec::new(),
        };
        let bytes = rmp_serde::to_vec(&snapshot).unwrap();

        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        let err = index.deserialize(&bytes).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn deserialize_rejects_garbage_bytes() {
        let index = HnswIndex::new(3, DistanceMetric::Cosine);
        let err = index.deserialize(b"not a valid snapshot").await.unwrap_err();
        assert!(matches!(err, IndexError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn tombstone_ratio_triggers_rebuild() {
        let index = HnswIndex::new(2, DistanceMetric::L2);
        let records: Vec<_> = (0..20)
            .map(|i| record(&format!("v{i}"), vec![i as f32, 0.0], HashMap::new()))
            .collect();
        index.build(records).await.unwrap();

        for i in 0..10 {
            index.remove(&VectorId::from_raw(format!("v{i}"))).await.unwrap();
        }
        // Tombstone ratio is now 50%; the next add should trigger a rebuild
        // and reclaim the tombstoned internal ids.
        index
            .add(record("v-new", vec![100.0, 0.0], HashMap::new()))
            .await
            .unwrap();

        assert_eq!(index.tombstoned.len(), 0);
        assert_eq!(index.stats().await.vector_count, 11);
    }
}

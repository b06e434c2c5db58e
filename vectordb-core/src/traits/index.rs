//! Approximate-nearest-neighbor index capability.

use crate::error::IndexError;
use crate::id::VectorId;
use crate::types::record::{DistanceMetric, QueryFilter, SearchHit, VectorRecord};
use async_trait::async_trait;

/// Statistics snapshot returned by [`AnnIndex::stats`].
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimensions: usize,
    pub memory_usage_bytes: usize,
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

/// In-memory ANN index over `dimensions`-dimensional vectors under a fixed
/// metric, pluggable per specification §4.2.
///
/// All operations preserve insertion-ordering stability for equal-score
/// results: ties are broken by id ascending.
#[async_trait]
pub trait AnnIndex: Send + Sync {
    /// Bulk construction, discarding any prior state. Empty input yields an
    /// empty index.
    async fn build(&self, records: Vec<VectorRecord>) -> Result<(), IndexError>;

    /// Incremental insertion. The implementation may rebuild internally to
    /// amortize cost; the externally observable effect is immediate
    /// membership.
    async fn add(&self, record: VectorRecord) -> Result<(), IndexError>;

    async fn add_batch(&self, records: Vec<VectorRecord>) -> Result<(), IndexError>;

    /// Membership deletion. Removing an absent id is a no-op.
    async fn remove(&self, id: &VectorId) -> Result<(), IndexError>;

    /// Ordered search, length at most `k`, sorted by score descending for
    /// cosine/dot or ascending for l2. If `filter` is present it is
    /// evaluated against each candidate's metadata before truncation; the
    /// index may over-fetch internally to compensate for selectivity.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Capture current membership and dimensions as an opaque byte string.
    async fn serialize(&self) -> Result<Vec<u8>, IndexError>;

    /// Restore state from a prior [`AnnIndex::serialize`] output.
    async fn deserialize(&self, bytes: &[u8]) -> Result<(), IndexError>;

    async fn stats(&self) -> IndexStats;

    fn metric(&self) -> DistanceMetric;

    fn dimensions(&self) -> usize;
}

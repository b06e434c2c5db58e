//! Core traits, types, and error taxonomy for the vectordb coordination
//! layer: the data model, capability contracts, and id generation shared
//! by every other crate in the workspace.

#![warn(missing_debug_implementations)]

pub mod error;
pub mod id;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Convenient glob import for downstream crates.
pub mod prelude {
    pub use crate::error::{IndexError, Result, StorageError, VectorDbError};
    pub use crate::id::VectorId;
    pub use crate::traits::{AnnIndex, EmbeddingGenerator, IndexStats, LlmProvider, Storage};
    pub use crate::types::{
        CompoundOp, DistanceMetric, EmbeddingConfig, EnvelopeVersion, ExportEnvelope,
        ExportMetadata, FilterOp, IndexConfig, PerformanceConfig, QueryFilter, SearchHit,
        StorageConfig, VectorDbConfig, VectorRecord, CURRENT_VERSION,
    };
}

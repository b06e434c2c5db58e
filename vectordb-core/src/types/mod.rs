//! Shared data model types.

pub mod config;
pub mod envelope;
pub mod record;

pub use config::{EmbeddingConfig, IndexConfig, PerformanceConfig, StorageConfig, VectorDbConfig};
pub use envelope::{EnvelopeVersion, ExportEnvelope, ExportMetadata, CURRENT_VERSION};
pub use record::{CompoundOp, DistanceMetric, FilterOp, QueryFilter, SearchHit, VectorRecord};

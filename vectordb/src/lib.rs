//! Embeddable vector database: a coordination layer over durable storage,
//! an in-memory ANN index, tiered caches, and a write-batch coalescer.
//!
//! [`VectorDb`] is the single entry point; it is generic over the
//! `vectordb-core` capability traits, so callers can plug in any
//! [`vectordb_core::traits::Storage`], [`vectordb_core::traits::AnnIndex`],
//! or [`vectordb_core::traits::EmbeddingGenerator`] implementation —
//! `vectordb-storage` and `vectordb-index` provide the reference ones.

#![warn(missing_debug_implementations)]

mod coordinator;
mod types;

pub use coordinator::VectorDb;
pub use types::{ExportChunk, ExportOptions, ImportOptions, InsertInput, SearchQuery, UpdateInput};

pub use vectordb_core::error::{Result, VectorDbError};
pub use vectordb_core::id::VectorId;
pub use vectordb_core::types::config::{
    EmbeddingConfig, IndexConfig, PerformanceConfig, StorageConfig, VectorDbConfig,
};
pub use vectordb_core::types::envelope::ExportEnvelope;
pub use vectordb_core::types::record::{
    CompoundOp, DistanceMetric, FilterOp, QueryFilter, SearchHit, VectorRecord,
};

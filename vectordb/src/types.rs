//! Request/response shapes for the `VectorDb` façade.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use vectordb_core::types::record::{QueryFilter, VectorRecord};

/// Input to [`crate::VectorDb::insert`] / [`crate::VectorDb::insert_batch`].
/// Exactly one of `vector`/`text` is expected; `vector` takes precedence if
/// both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertInput {
    pub vector: Option<Vec<f32>>,
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Partial update for [`crate::VectorDb::update`]. Every field is optional;
/// absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInput {
    pub vector: Option<Vec<f32>>,
    pub text: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

/// A similarity query, resolved from either a raw vector or text (routed
/// through the embedding cache and generator).
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub vector: Option<Vec<f32>>,
    pub text: Option<String>,
    pub k: usize,
    pub filter: Option<QueryFilter>,
    /// Populate `SearchHit.vector` by hydrating from the cache/storage.
    pub hydrate_vectors: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            vector: None,
            text: None,
            k: 10,
            filter: None,
            hydrate_vectors: false,
        }
    }
}

/// Options for [`crate::VectorDb::export`] / [`crate::VectorDb::export_stream`].
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub include_index: bool,
    pub chunk_size: Option<usize>,
}

/// Options for [`crate::VectorDb::import`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub clear_existing: bool,
}

/// One piece of a streamed export, in the order the envelope is defined:
/// metadata, then N vector chunks, then an optional index blob.
#[derive(Debug, Clone)]
pub enum ExportChunk {
    Metadata {
        exported_at: i64,
        vector_count: usize,
        dimensions: usize,
    },
    Vectors(Vec<VectorRecord>),
    Index(String),
}

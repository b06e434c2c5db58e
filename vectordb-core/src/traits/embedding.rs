//! `EmbeddingGenerator` capability contract, specification §6.2.
//!
//! Kept independent of any concrete provider (OpenAI, local ONNX, ...) so
//! the coordinator never depends on embedding internals, mirroring
//! `llmspell_core::traits::embedding::EmbeddingProvider`'s separation from
//! `llmspell-rag`'s concrete providers.

use crate::error::VectorDbError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Text-to-vector capability. Implementations guarantee output length
/// equals [`EmbeddingGenerator::dimensions`] and, for cosine metrics,
/// L2-normalized vectors.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Load the underlying model. Idempotent.
    async fn initialize(&self) -> Result<(), VectorDbError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorDbError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorDbError>;

    fn dimensions(&self) -> usize;

    async fn dispose(&self);
}

/// Optional capability for retrieval-augmented generation; out of the
/// coordination layer's scope but specified as an external collaborator's
/// contract (specification §1, §6.2).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, VectorDbError>;

    /// Streamed generation; chunks arrive as they are produced.
    fn generate_stream(&self, prompt: &str) -> BoxStream<'_, Result<String, VectorDbError>>;

    async fn dispose(&self);
}

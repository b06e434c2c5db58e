//! Deterministic test doubles shared across the workspace's property and
//! scenario tests.
//!
//! Grounded in `llmspell-rag`'s `LocalEmbedding` mock: hash the input text
//! to seed a pseudo-random, L2-normalized vector of the configured
//! dimension, so repeated calls with the same text produce the same
//! embedding without pulling in a real model.

use crate::error::VectorDbError;
use crate::traits::embedding::EmbeddingGenerator;
use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

/// Deterministic, hash-seeded embedding generator for tests.
#[derive(Debug)]
pub struct MockEmbeddingGenerator {
    dimensions: usize,
    initialized: AtomicBool,
}

impl MockEmbeddingGenerator {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            initialized: AtomicBool::new(false),
        }
    }

    fn mock_embedding(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|i| (((seed.wrapping_mul(i as u64 + 1)) % 2000) as f32 / 1000.0) - 1.0)
            .collect();

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    async fn initialize(&self) -> Result<(), VectorDbError> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorDbError> {
        Ok(self.mock_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorDbError> {
        Ok(texts.iter().map(|t| self.mock_embedding(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn dispose(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let gen = MockEmbeddingGenerator::new(8);
        let a = gen.embed("hello world").await.unwrap();
        let b = gen.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let gen = MockEmbeddingGenerator::new(8);
        let a = gen.embed("hello").await.unwrap();
        let b = gen.embed("world").await.unwrap();
        assert_ne!(a, b);
    }
}

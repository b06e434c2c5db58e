//! Capability contracts: trait boundaries a backend plugs into.

pub mod embedding;
pub mod index;
pub mod storage;

pub use embedding::{EmbeddingGenerator, LlmProvider};
pub use index::{AnnIndex, IndexStats};
pub use storage::Storage;

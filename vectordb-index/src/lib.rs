//! HNSW-backed `AnnIndex` implementation.

#![warn(missing_debug_implementations)]

pub mod hnsw;

pub use hnsw::{HnswIndex, HnswParams};

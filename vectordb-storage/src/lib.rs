//! `Storage` capability backends and the `ProgressiveLoader`.

#![warn(missing_debug_implementations)]

pub mod loader;
pub mod memory;
pub mod sled_backend;

pub use loader::{ProgressiveLoader, DEFAULT_CHUNK_SIZE};
pub use memory::MemoryStorage;
pub use sled_backend::SledStorage;

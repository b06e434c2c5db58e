//! Error types and handling for vectordb
//!
//! Leaf components raise their own narrower error enums (see
//! `vectordb-storage::StorageError`, `vectordb-index::IndexError`); this
//! enum is the coordinator-facing taxonomy from the specification and is
//! what callers of `vectordb::VectorDb` actually see.

use thiserror::Error;

/// Comprehensive error enum for all vectordb operations.
#[derive(Debug, Error)]
pub enum VectorDbError {
    #[error("database not initialized: {message}")]
    NotInitialized { message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("invalid insert data: {message}")]
    InvalidInsertData { message: String },

    #[error("invalid export data: {message}")]
    InvalidExportData { message: String },

    #[error("export version {found} incompatible with current {current}")]
    VersionIncompatible { found: String, current: String },

    #[error("index corrupted: {message}")]
    IndexCorrupted { message: String },

    #[error("storage error: {message}")]
    StorageError { message: String },

    #[error("model load error: {message}")]
    ModelLoadError { message: String },

    #[error("init failed: {message}")]
    InitError { message: String },
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, VectorDbError>;

/// Errors raised by a [`crate::traits::storage::Storage`] backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("storage quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Errors raised by an [`crate::traits::index::AnnIndex`] implementation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index corrupted: {message}")]
    Corrupted { message: String },
}

impl From<StorageError> for VectorDbError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { message } | StorageError::QuotaExceeded { message } => {
                Self::StorageError { message }
            }
            StorageError::Serialization { message } => Self::StorageError { message },
        }
    }
}

impl From<IndexError> for VectorDbError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            IndexError::Corrupted { message } => Self::IndexCorrupted { message },
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Malformed document {}: {}", .path.display(), .reason)]
    MalformedDocument { path: PathBuf, reason: String },

    #[error(
        "Embedding dimension mismatch for collection '{collection}': expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        collection: String,
        /// Vector width of the collection's table
        expected: usize,
        /// Width of the vectors being written or queried
        actual: usize,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod indexer;
pub mod search;

#[cfg(test)]
mod test_support;

pub use context::RagContext;

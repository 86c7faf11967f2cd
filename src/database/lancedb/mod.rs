// LanceDB vector database module
// One table per collection, holding chunk text, its embedding and fixed-schema metadata


pub mod vector_store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::Chunk;

pub use vector_store::{Collection, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// `"{source_path}:{chunk_index}"`, unique within the collection
    pub id: String,
    /// The vector embedding
    pub vector: Vec<f32>,
    /// The chunk text the vector was computed from
    pub text: String,
    /// Metadata about the chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside every embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the source document
    pub source_path: String,
    /// Index of this chunk within the document
    pub chunk_index: u32,
    /// Number of chunks the document produced
    pub chunk_count: u32,
    /// RFC 3339 timestamp when the chunk was produced
    pub created_at: String,
    /// Collection the record belongs to
    pub collection: String,
    /// Free-form string tags, stored as a JSON column
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A record returned by a nearest-neighbor query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Distance to the query vector under the store's metric; lower is closer
    pub distance: f32,
}

/// Record id for a chunk of a source document
#[inline]
pub fn record_id(source_path: &str, chunk_index: usize) -> String {
    format!("{}:{}", source_path, chunk_index)
}

impl ChunkMetadata {
    /// Metadata for `chunk` stored in `collection`
    #[inline]
    pub fn for_chunk(chunk: &Chunk, collection: &str, tags: &BTreeMap<String, String>) -> Self {
        Self {
            source_path: chunk.source_path.clone(),
            chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
            chunk_count: u32::try_from(chunk.chunk_count).unwrap_or(u32::MAX),
            created_at: chunk.created_at.to_rfc3339(),
            collection: collection.to_string(),
            tags: tags.clone(),
        }
    }
}

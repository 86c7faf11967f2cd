
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Last-seen content hash of a document in one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentHash {
    pub collection: String,
    pub source_path: String,
    pub content_hash: String,
    pub chunk_count: i64,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentHash {
    #[inline]
    pub fn matches(&self, content_hash: &str) -> bool {
        self.content_hash == content_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub query: String,
    pub top_k: i64,
    pub result_count: i64,
    /// Comma-separated names of the collections searched
    pub collections: String,
    pub searched_at: DateTime<Utc>,
}

impl SearchHistoryEntry {
    #[inline]
    pub fn collection_names(&self) -> Vec<&str> {
        self.collections
            .split(',')
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSearchHistory {
    pub query: String,
    pub top_k: i64,
    pub result_count: i64,
    pub collections: Vec<String>,
}

/// Row count of the side table for one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CollectionDocumentCount {
    pub collection: String,
    pub documents: i64,
    pub chunks: i64,
}

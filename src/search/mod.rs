// Search module
// Embed a query once, ask every collection for its nearest chunks, merge by distance

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::lancedb::{ChunkMetadata, StoredHit, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewSearchHistory;
use crate::embeddings::Embedder;

/// One ranked chunk with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Lower is more similar
    pub distance: f32,
    /// Collection the chunk was found in
    pub collection: String,
}

impl QueryResult {
    #[inline]
    pub fn from_hit(hit: StoredHit, collection: &str) -> Self {
        Self {
            id: hit.id,
            text: hit.text,
            metadata: hit.metadata,
            distance: hit.distance,
            collection: collection.to_string(),
        }
    }

    /// `1 - distance`; meaningful for cosine distance
    #[inline]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// A requested collection that was not searched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCollection {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<QueryResult>,
    pub skipped: Vec<SkippedCollection>,
}

/// Concatenate per-collection results, sort by ascending distance and keep `top_k`.
///
/// Equal distances are ordered by collection name, then record id.
#[inline]
pub fn merge_results(per_collection: Vec<Vec<QueryResult>>, top_k: usize) -> Vec<QueryResult> {
    let mut merged: Vec<QueryResult> = per_collection.into_iter().flatten().collect();
    merged.sort_by(compare_results);
    merged.truncate(top_k);
    merged
}

fn compare_results(a: &QueryResult, b: &QueryResult) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.collection.cmp(&b.collection))
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep results whose similarity is at least `threshold`
#[inline]
pub fn filter_by_similarity(results: Vec<QueryResult>, threshold: f32) -> Vec<QueryResult> {
    results
        .into_iter()
        .filter(|result| result.similarity() >= threshold)
        .collect()
}

/// Query pipeline over the configured collections
#[derive(Clone)]
pub struct Searcher {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<VectorStore>,
    database: Option<Database>,
    collections: Vec<String>,
    record_history: bool,
}

impl Searcher {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<VectorStore>,
        database: Option<Database>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            database,
            collections: config.storage.collection_names.clone(),
            record_history: config.search.record_history,
        }
    }

    /// Search every configured collection
    #[inline]
    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse, RagError> {
        let collections = self.collections.clone();
        self.search_collections(query, top_k, &collections).await
    }

    /// Search the named collections; names that are not configured are skipped and reported
    #[inline]
    pub async fn search_collections(
        &self,
        query: &str,
        top_k: usize,
        collections: &[String],
    ) -> Result<SearchResponse, RagError> {
        let mut skipped = Vec::new();
        let mut targets: Vec<&str> = Vec::new();

        for name in collections {
            if !self.collections.iter().any(|c| c == name) {
                let error = RagError::CollectionNotFound(name.clone());
                warn!("Skipping collection: {}", error);
                skipped.push(SkippedCollection {
                    name: name.clone(),
                    reason: error.to_string(),
                });
            } else if !targets.contains(&name.as_str()) {
                targets.push(name.as_str());
            }
        }

        let results = if top_k == 0 || targets.is_empty() {
            Vec::new()
        } else {
            let embedding = self.embedder.encode(query)?;
            debug!(
                "Querying {} collections for top {} results",
                targets.len(),
                top_k
            );

            let per_collection = join_all(
                targets
                    .iter()
                    .map(|name| self.query_collection(name, &embedding, top_k)),
            )
            .await
            .into_iter()
            .collect::<Result<Vec<_>, RagError>>()?;

            merge_results(per_collection, top_k)
        };

        info!(
            "Search returned {} results from {} collections",
            results.len(),
            targets.len()
        );

        self.record(query, top_k, results.len(), &targets).await;

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            skipped,
        })
    }

    async fn query_collection(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryResult>, RagError> {
        let hits = self.vector_store.query(name, embedding, top_k).await?;
        debug!("Collection '{}' contributed {} hits", name, hits.len());
        Ok(hits
            .into_iter()
            .map(|hit| QueryResult::from_hit(hit, name))
            .collect())
    }

    async fn record(&self, query: &str, top_k: usize, result_count: usize, collections: &[&str]) {
        if !self.record_history {
            return;
        }
        let Some(database) = &self.database else {
            return;
        };

        let entry = NewSearchHistory {
            query: query.to_string(),
            top_k: i64::try_from(top_k).unwrap_or(i64::MAX),
            result_count: i64::try_from(result_count).unwrap_or(i64::MAX),
            collections: collections.iter().map(|c| (*c).to_string()).collect(),
        };

        if let Err(e) = database.record_search(&entry).await {
            warn!("Failed to record search history: {:#}", e);
        }
    }
}

// Retrieval context
// Owns the resident embedding model, the open vector store and the side table for a process lifetime

use std::sync::Arc;

use tracing::{info, warn};

use crate::RagError;
use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::{Embedder, load_embedder};
use crate::indexer::{ChangeDetector, Indexer};
use crate::search::{SearchResponse, Searcher};

/// Everything a retrieval call needs, constructed once and passed explicitly.
///
/// ```no_run
/// # async fn run() -> Result<(), hub_rag::RagError> {
/// let config = hub_rag::config::Config::load_default()?;
/// let context = hub_rag::RagContext::open(config).await?;
/// let response = context.search("Professor Chen trauma healing", None).await?;
/// for result in &response.results {
///     println!("{} {:.3} {}", result.collection, result.distance, result.text);
/// }
/// context.close().await;
/// # Ok(())
/// # }
/// ```
pub struct RagContext {
    config: Config,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<VectorStore>,
    database: Option<Database>,
}

impl RagContext {
    /// Validate `config`, load the configured embedding model and open storage
    #[inline]
    pub async fn open(config: Config) -> Result<Self, RagError> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let embedder = load_embedder(&config)?;
        Self::with_embedder(config, embedder).await
    }

    /// Open storage around an already loaded embedder.
    ///
    /// The side table is optional: if it cannot be opened the context still
    /// serves queries and every ingested document is treated as changed.
    #[inline]
    pub async fn with_embedder(
        config: Config,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let vector_store = VectorStore::open(
            &config.vector_database_path(),
            embedder.dimension(),
            config.search.distance_metric,
        )
        .await?;

        let database = match Database::initialize_in_dir(&config.storage_dir()).await {
            Ok(database) => Some(database),
            Err(e) => {
                warn!(
                    "Side table unavailable at {}, continuing without change detection: {:#}",
                    config.database_path().display(),
                    e
                );
                None
            }
        };

        info!(
            "Retrieval context ready: model {}, collections {:?}",
            embedder.model_name(),
            config.storage.collection_names
        );

        Ok(Self {
            config,
            embedder,
            vector_store: Arc::new(vector_store),
            database,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    #[inline]
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    #[inline]
    pub fn indexer(&self) -> Indexer {
        Indexer::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.vector_store),
            ChangeDetector::new(self.database.clone()),
            &self.config,
        )
    }

    #[inline]
    pub fn searcher(&self) -> Searcher {
        Searcher::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.vector_store),
            self.database.clone(),
            &self.config,
        )
    }

    /// Search every configured collection; `None` uses the configured `top_k`
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<SearchResponse, RagError> {
        let top_k = top_k.unwrap_or(self.config.search.top_k);
        self.searcher().search(query, top_k).await
    }

    /// Drop a collection and forget its stored hashes; returns whether it existed
    #[inline]
    pub async fn reset_collection(&self, name: &str) -> Result<bool, RagError> {
        let dropped = self.vector_store.drop_collection(name).await?;
        ChangeDetector::new(self.database.clone())
            .forget_collection(name)
            .await;
        Ok(dropped)
    }

    /// Release the side-table connections
    #[inline]
    pub async fn close(self) {
        if let Some(database) = self.database {
            database.close().await;
        }
    }
}

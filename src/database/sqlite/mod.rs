use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    CollectionDocumentCount, DocumentHash, NewSearchHistory, SearchHistoryEntry,
};
use crate::database::sqlite::queries::{DocumentHashQueries, SearchHistoryQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite side table holding document hashes and search history
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `metadata.db` inside `storage_dir`, creating the directory if needed
    pub async fn initialize_in_dir(storage_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_dir).with_context(|| {
            format!(
                "Failed to create storage directory: {}",
                storage_dir.display()
            )
        })?;

        Self::new(storage_dir.join("metadata.db")).await
    }

    // Document hash operations
    pub async fn get_document_hash(
        &self,
        collection: &str,
        source_path: &str,
    ) -> Result<Option<DocumentHash>> {
        DocumentHashQueries::get(&self.pool, collection, source_path).await
    }

    pub async fn store_document_hash(
        &self,
        collection: &str,
        source_path: &str,
        content_hash: &str,
        chunk_count: i64,
    ) -> Result<DocumentHash> {
        DocumentHashQueries::upsert(&self.pool, collection, source_path, content_hash, chunk_count)
            .await
    }

    pub async fn list_document_hashes(&self, collection: &str) -> Result<Vec<DocumentHash>> {
        DocumentHashQueries::list_for_collection(&self.pool, collection).await
    }

    pub async fn forget_collection(&self, collection: &str) -> Result<u64> {
        DocumentHashQueries::delete_collection(&self.pool, collection).await
    }

    pub async fn document_counts(&self) -> Result<Vec<CollectionDocumentCount>> {
        DocumentHashQueries::counts_by_collection(&self.pool).await
    }

    // Search history operations
    pub async fn record_search(&self, entry: &NewSearchHistory) -> Result<i64> {
        SearchHistoryQueries::record(&self.pool, entry).await
    }

    pub async fn recent_searches(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        SearchHistoryQueries::recent(&self.pool, limit).await
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}


use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct DocumentHashQueries;

impl DocumentHashQueries {
    #[inline]
    pub async fn get(
        pool: &SqlitePool,
        collection: &str,
        source_path: &str,
    ) -> Result<Option<DocumentHash>> {
        sqlx::query_as::<_, DocumentHash>(
            r#"
            SELECT collection, source_path, content_hash, chunk_count, ingested_at
            FROM document_hashes
            WHERE collection = ? AND source_path = ?
            "#,
        )
        .bind(collection)
        .bind(source_path)
        .fetch_optional(pool)
        .await
        .context("Failed to get document hash")
    }

    /// Insert or replace the hash row for (collection, source_path)
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        collection: &str,
        source_path: &str,
        content_hash: &str,
        chunk_count: i64,
    ) -> Result<DocumentHash> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO document_hashes (collection, source_path, content_hash, chunk_count, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (collection, source_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                chunk_count = excluded.chunk_count,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(collection)
        .bind(source_path)
        .bind(content_hash)
        .bind(chunk_count)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to store document hash")?;

        debug!(
            "Stored hash for {} in {} ({} chunks)",
            source_path, collection, chunk_count
        );

        Self::get(pool, collection, source_path)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve stored document hash"))
    }

    #[inline]
    pub async fn list_for_collection(
        pool: &SqlitePool,
        collection: &str,
    ) -> Result<Vec<DocumentHash>> {
        sqlx::query_as::<_, DocumentHash>(
            r#"
            SELECT collection, source_path, content_hash, chunk_count, ingested_at
            FROM document_hashes
            WHERE collection = ?
            ORDER BY source_path
            "#,
        )
        .bind(collection)
        .fetch_all(pool)
        .await
        .context("Failed to list document hashes")
    }

    /// Forget every document of a collection; returns the number of rows removed
    #[inline]
    pub async fn delete_collection(pool: &SqlitePool, collection: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_hashes WHERE collection = ?")
            .bind(collection)
            .execute(pool)
            .await
            .context("Failed to delete collection hashes")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn counts_by_collection(pool: &SqlitePool) -> Result<Vec<CollectionDocumentCount>> {
        sqlx::query_as::<_, CollectionDocumentCount>(
            r#"
            SELECT collection,
                   COUNT(*) AS documents,
                   COALESCE(SUM(chunk_count), 0) AS chunks
            FROM document_hashes
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to count documents by collection")
    }
}

pub struct SearchHistoryQueries;

impl SearchHistoryQueries {
    #[inline]
    pub async fn record(pool: &SqlitePool, entry: &NewSearchHistory) -> Result<i64> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO search_history (query, top_k, result_count, collections, searched_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.query)
        .bind(entry.top_k)
        .bind(entry.result_count)
        .bind(entry.collections.join(","))
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record search")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Most recent searches first
    #[inline]
    pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        sqlx::query_as::<_, SearchHistoryEntry>(
            r#"
            SELECT id, query, top_k, result_count, collections, searched_at
            FROM search_history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list search history")
    }
}

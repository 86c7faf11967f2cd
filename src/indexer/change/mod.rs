
use tracing::{debug, warn};

use crate::database::sqlite::Database;

/// Whether a document needs to be (re)indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// No hash stored for this (collection, path)
    New,
    /// Stored hash differs, or could not be read
    Changed,
    /// Stored hash matches; `chunks` is the chunk count recorded with it
    Unchanged { chunks: usize },
}

impl ChangeStatus {
    #[inline]
    pub fn needs_indexing(self) -> bool {
        !matches!(self, ChangeStatus::Unchanged { .. })
    }
}

/// Content-hash cache over the SQLite side table.
///
/// The cache is never authoritative: any failure to read it reports the
/// document as changed, and any failure to write it is logged and ignored,
/// so the worst case is re-embedding a document that did not change.
/// An `Unchanged` answer only says what the table remembers; the indexer
/// still confirms the chunks are present in the vector store.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    database: Option<Database>,
}

impl ChangeDetector {
    #[inline]
    pub fn new(database: Option<Database>) -> Self {
        Self { database }
    }

    #[inline]
    pub async fn check(&self, collection: &str, source_path: &str, content_hash: &str) -> ChangeStatus {
        let Some(database) = &self.database else {
            return ChangeStatus::New;
        };

        match database.get_document_hash(collection, source_path).await {
            Ok(Some(row)) if row.matches(content_hash) => {
                debug!("{} unchanged in {}", source_path, collection);
                ChangeStatus::Unchanged {
                    chunks: usize::try_from(row.chunk_count).unwrap_or_default(),
                }
            }
            Ok(Some(_)) => ChangeStatus::Changed,
            Ok(None) => ChangeStatus::New,
            Err(e) => {
                warn!(
                    "Could not read stored hash for {} in {}, reindexing: {:#}",
                    source_path, collection, e
                );
                ChangeStatus::Changed
            }
        }
    }

    /// Remember the hash of a document that was fully indexed
    #[inline]
    pub async fn record(
        &self,
        collection: &str,
        source_path: &str,
        content_hash: &str,
        chunk_count: usize,
    ) {
        let Some(database) = &self.database else {
            return;
        };

        let chunk_count = i64::try_from(chunk_count).unwrap_or(i64::MAX);
        if let Err(e) = database
            .store_document_hash(collection, source_path, content_hash, chunk_count)
            .await
        {
            warn!(
                "Could not store hash for {} in {}; it will be reindexed next time: {:#}",
                source_path, collection, e
            );
        }
    }

    /// Drop every stored hash for a collection
    #[inline]
    pub async fn forget_collection(&self, collection: &str) {
        let Some(database) = &self.database else {
            return;
        };

        match database.forget_collection(collection).await {
            Ok(removed) => debug!("Forgot {} document hashes for {}", removed, collection),
            Err(e) => warn!("Could not clear hashes for {}: {:#}", collection, e),
        }
    }
}

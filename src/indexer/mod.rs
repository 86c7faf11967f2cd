// Indexer module
// Turns documents into stored chunk records, skipping documents whose content has not changed

pub mod change;


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::RagError;
use crate::config::{Config, validate_collection_name};
use crate::database::lancedb::{ChunkMetadata, ChunkRecord, VectorStore, record_id};
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::embeddings::chunking::{ChunkingConfig, chunk_document};

pub use change::{ChangeDetector, ChangeStatus};

/// Options for a single ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Reindex even when the stored content hash matches
    pub force: bool,
    /// Tags copied into every chunk's metadata
    pub tags: BTreeMap<String, String>,
    /// Draw a progress bar on an attended terminal
    pub show_progress: bool,
}

/// What happened to one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Chunks were embedded and upserted
    Indexed { chunks: usize },
    /// Content hash matched; nothing was embedded or written
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of a bulk ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub indexed: Vec<(PathBuf, usize)>,
    pub unchanged: Vec<PathBuf>,
    pub failed: Vec<DocumentFailure>,
}

impl IngestReport {
    #[inline]
    pub fn documents_seen(&self) -> usize {
        self.indexed.len() + self.unchanged.len() + self.failed.len()
    }

    #[inline]
    pub fn chunks_written(&self) -> usize {
        self.indexed.iter().map(|(_, chunks)| chunks).sum()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ingestion pipeline: hash, compare, chunk, embed, upsert, prune, record
#[derive(Clone)]
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<VectorStore>,
    change_detector: ChangeDetector,
    chunking: ChunkingConfig,
    include_extensions: Vec<String>,
    configured_collections: Vec<String>,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<VectorStore>,
        change_detector: ChangeDetector,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            change_detector,
            chunking: config.chunking,
            include_extensions: config.ingest.include_extensions.clone(),
            configured_collections: config.storage.collection_names.clone(),
        }
    }

    /// Index one in-memory document into `collection`.
    ///
    /// The stored hash is only updated after every chunk has been upserted,
    /// so a failure anywhere earlier leaves the document to be fully
    /// reprocessed by the next run.
    #[inline]
    pub async fn ingest_document(
        &self,
        document: &Document,
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestOutcome, RagError> {
        self.check_target(collection)?;
        self.index_document(document, collection, options).await
    }

    /// Reject invalid collection names before any hashing or embedding,
    /// and warn once when the target is not searched by default
    fn check_target(&self, collection: &str) -> Result<(), RagError> {
        validate_collection_name(collection).map_err(|e| RagError::Config(e.to_string()))?;

        if !self.configured_collections.iter().any(|c| c == collection) {
            warn!(
                "Collection '{}' is not configured; default searches will not include it",
                collection
            );
        }
        Ok(())
    }

    async fn index_document(
        &self,
        document: &Document,
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestOutcome, RagError> {
        let source_path = document.source_path();

        if !options.force {
            let status = match self
                .change_detector
                .check(collection, &source_path, &document.content_hash)
                .await
            {
                ChangeStatus::Unchanged { chunks } => {
                    self.confirm_stored(collection, &source_path, chunks).await
                }
                other => other,
            };
            if !status.needs_indexing() {
                info!("Skipping unchanged document {}", source_path);
                return Ok(IngestOutcome::Unchanged);
            }
            debug!("Document {} is {:?}", source_path, status);
        }

        let chunks = chunk_document(document, &self.chunking)?;
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.encode_batch(&texts)?
        };

        if vectors.len() != chunks.len() {
            return Err(RagError::ModelUnavailable(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                id: record_id(&chunk.source_path, chunk.chunk_index),
                vector,
                text: chunk.text.clone(),
                metadata: ChunkMetadata::for_chunk(chunk, collection, &options.tags),
            })
            .collect();

        let table = self.vector_store.get_or_create_collection(collection).await?;
        table.upsert(&records).await?;
        table
            .prune_source(&source_path, u32::try_from(records.len()).unwrap_or(u32::MAX))
            .await?;

        self.change_detector
            .record(collection, &source_path, &document.content_hash, records.len())
            .await;

        info!(
            "Indexed {} into '{}' ({} chunks)",
            source_path,
            collection,
            records.len()
        );
        Ok(IngestOutcome::Indexed {
            chunks: records.len(),
        })
    }

    /// Read and index a single file
    #[inline]
    pub async fn ingest_file(
        &self,
        path: &Path,
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestOutcome, RagError> {
        self.check_target(collection)?;
        self.read_and_index(path, collection, options).await
    }

    async fn read_and_index(
        &self,
        path: &Path,
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestOutcome, RagError> {
        let document = Document::read(path).await?;
        self.index_document(&document, collection, options).await
    }

    /// Trust a remembered hash only while the collection still holds the
    /// recorded number of chunks for the document
    async fn confirm_stored(&self, collection: &str, source_path: &str, chunks: usize) -> ChangeStatus {
        let stored = match self.vector_store.collection(collection).await {
            Ok(Some(table)) => table.count_source(source_path).await,
            Ok(None) => Ok(0),
            Err(e) => Err(e),
        };

        match stored {
            Ok(count) if count == chunks => ChangeStatus::Unchanged { chunks },
            Ok(count) => {
                warn!(
                    "{} has {} stored chunks in '{}' but {} were recorded, reindexing",
                    source_path, count, collection, chunks
                );
                ChangeStatus::Changed
            }
            Err(e) => {
                warn!(
                    "Could not verify stored chunks of {} in '{}', reindexing: {}",
                    source_path, collection, e
                );
                ChangeStatus::Changed
            }
        }
    }

    /// Index files and directories, continuing past per-document failures
    #[inline]
    pub async fn ingest_paths(
        &self,
        paths: &[PathBuf],
        collection: &str,
        options: &IngestOptions,
    ) -> Result<IngestReport, RagError> {
        self.check_target(collection)?;

        let mut report = IngestReport::default();
        let files = self.collect_files(paths, &mut report);

        info!(
            "Ingesting {} files into '{}'",
            files.len(),
            collection
        );

        let bar = if options.show_progress && console::user_attended_stderr() {
            ProgressBar::new(files.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            )
        } else {
            ProgressBar::hidden()
        };

        for path in files {
            bar.set_message(path.display().to_string());

            match self.read_and_index(&path, collection, options).await {
                Ok(IngestOutcome::Indexed { chunks }) => report.indexed.push((path, chunks)),
                Ok(IngestOutcome::Unchanged) => report.unchanged.push(path),
                Err(e) => {
                    error!("Failed to ingest {}: {}", path.display(), e);
                    report.failed.push(DocumentFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }

            bar.inc(1);
        }
        bar.finish_and_clear();

        info!(
            "Ingestion into '{}' finished: {} indexed, {} unchanged, {} failed",
            collection,
            report.indexed.len(),
            report.unchanged.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Expand directories into their matching files, in path order.
    ///
    /// Explicit file arguments are kept whatever their extension; files
    /// found inside directories must match `include_extensions` and hidden
    /// entries are skipped. Missing paths are recorded as failures.
    fn collect_files(&self, paths: &[PathBuf], report: &mut IngestReport) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_file() {
                files.push(path.clone());
                continue;
            }

            if !path.is_dir() {
                warn!("Skipping missing path {}", path.display());
                report.failed.push(DocumentFailure {
                    path: path.clone(),
                    error: RagError::MalformedDocument {
                        path: path.clone(),
                        reason: "no such file or directory".to_string(),
                    }
                    .to_string(),
                });
                continue;
            }

            let walker = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if self.has_included_extension(entry.path()) {
                            files.push(entry.into_path());
                        } else {
                            debug!("Skipping {}", entry.path().display());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to read directory entry: {}", e),
                }
            }
        }

        files.sort();
        files.dedup();
        files
    }

    fn has_included_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.include_extensions
                    .iter()
                    .any(|included| included.eq_ignore_ascii_case(ext))
            })
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

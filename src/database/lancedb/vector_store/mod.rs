#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use tracing::{debug, info, warn};

use super::{ChunkMetadata, ChunkRecord, StoredHit};
use crate::RagError;
use crate::config::{DistanceMetric, validate_collection_name};

/// Embedded LanceDB database holding one table per collection
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
    dimension: usize,
    metric: DistanceMetric,
}

/// Handle to a single collection's table
#[derive(Clone)]
pub struct Collection {
    name: String,
    table: Table,
    dimension: usize,
    metric: DistanceMetric,
}

impl std::fmt::Debug for Collection {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

fn store_error(action: &str, e: impl std::fmt::Display) -> RagError {
    RagError::StoreUnavailable(format!("{}: {}", action, e))
}

/// Quote a string literal for a LanceDB filter expression
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Arrow schema for a collection table with vectors of `vector_dim` floats
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("chunk_count", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("collection", DataType::Utf8, false),
        Field::new("tags", DataType::Utf8, false),
    ]))
}

impl VectorStore {
    /// Open (or create) the vector database directory at `path`.
    ///
    /// Every collection opened through this store must hold vectors of
    /// `dimension` floats; queries rank by `metric`.
    #[inline]
    pub async fn open(
        path: &Path,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            store_error(
                &format!("Failed to create vector database directory {}", path.display()),
                e,
            )
        })?;

        let uri = path.to_string_lossy().into_owned();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| store_error("Failed to connect to LanceDB", e))?;

        info!(
            "Vector store opened at {} ({} dimensions, {} distance)",
            path.display(),
            dimension,
            metric
        );

        Ok(Self {
            connection,
            path: path.to_path_buf(),
            dimension,
            metric,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Names of all collections that have a table, sorted
    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        let mut names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error("Failed to list tables", e))?;
        names.sort();
        Ok(names)
    }

    /// Open an existing collection without creating it
    #[inline]
    pub async fn collection(&self, name: &str) -> Result<Option<Collection>, RagError> {
        if !self.list_collections().await?.iter().any(|n| n == name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| store_error(&format!("Failed to open collection '{}'", name), e))?;

        let stored_dimension = detect_vector_dimension(&table).await?;
        if stored_dimension != self.dimension {
            return Err(RagError::DimensionMismatch {
                collection: name.to_string(),
                expected: stored_dimension,
                actual: self.dimension,
            });
        }

        Ok(Some(self.handle(name, table)))
    }

    /// Open a collection, creating an empty table on first use
    #[inline]
    pub async fn get_or_create_collection(&self, name: &str) -> Result<Collection, RagError> {
        validate_collection_name(name).map_err(|e| RagError::Config(e.to_string()))?;

        if let Some(collection) = self.collection(name).await? {
            return Ok(collection);
        }

        info!(
            "Creating collection '{}' with {} dimensions",
            name, self.dimension
        );

        let table = self
            .connection
            .create_empty_table(name, create_schema(self.dimension))
            .execute()
            .await
            .map_err(|e| store_error(&format!("Failed to create collection '{}'", name), e))?;

        Ok(self.handle(name, table))
    }

    /// Drop a collection and every record in it; returns whether it existed
    #[inline]
    pub async fn drop_collection(&self, name: &str) -> Result<bool, RagError> {
        if !self.list_collections().await?.iter().any(|n| n == name) {
            debug!("Collection '{}' does not exist, nothing to drop", name);
            return Ok(false);
        }

        self.connection
            .drop_table(name)
            .await
            .map_err(|e| store_error(&format!("Failed to drop collection '{}'", name), e))?;

        info!("Dropped collection '{}'", name);
        Ok(true)
    }

    /// Upsert parallel arrays of ids, embeddings, texts and metadata into `collection`
    #[inline]
    pub async fn insert(
        &self,
        collection: &str,
        ids: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadatas: Vec<ChunkMetadata>,
    ) -> Result<(), RagError> {
        let len = ids.len();
        if embeddings.len() != len || texts.len() != len || metadatas.len() != len {
            return Err(RagError::Other(anyhow::anyhow!(
                "insert into '{}' needs equal lengths: {} ids, {} embeddings, {} texts, {} metadatas",
                collection,
                len,
                embeddings.len(),
                texts.len(),
                metadatas.len()
            )));
        }

        let records: Vec<ChunkRecord> = ids
            .into_iter()
            .zip(embeddings)
            .zip(texts)
            .zip(metadatas)
            .map(|(((id, vector), text), metadata)| ChunkRecord {
                id,
                vector,
                text,
                metadata,
            })
            .collect();

        self.get_or_create_collection(collection)
            .await?
            .upsert(&records)
            .await
    }

    /// Nearest-neighbor query against one collection; a missing table is empty
    #[inline]
    pub async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<StoredHit>, RagError> {
        match self.collection(collection).await? {
            Some(handle) => handle.query(embedding, top_k).await,
            None => {
                debug!("Collection '{}' has no table yet", collection);
                Ok(Vec::new())
            }
        }
    }

    fn handle(&self, name: &str, table: Table) -> Collection {
        Collection {
            name: name.to_string(),
            table,
            dimension: self.dimension,
            metric: self.metric,
        }
    }
}

/// Read the vector column width from an existing table's schema
async fn detect_vector_dimension(table: &Table) -> Result<usize, RagError> {
    let schema = table
        .schema()
        .await
        .map_err(|e| store_error("Failed to get table schema", e))?;

    for field in schema.fields() {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, size) = field.data_type() {
                return Ok(*size as usize);
            }
        }
    }

    Err(RagError::StoreUnavailable(format!(
        "table '{}' has no fixed-size vector column",
        table.name()
    )))
}

impl Collection {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert records, overwriting any existing record with the same id
    #[inline]
    pub async fn upsert(&self, records: &[ChunkRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            debug!("No records to upsert into '{}'", self.name);
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected: self.dimension,
                    actual: record.vector.len(),
                });
            }
            if !seen.insert(record.id.as_str()) {
                return Err(RagError::Other(anyhow::anyhow!(
                    "duplicate record id '{}' in upsert batch for '{}'",
                    record.id,
                    self.name
                )));
            }
        }

        debug!("Upserting {} records into '{}'", records.len(), self.name);

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = self.table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| store_error(&format!("Failed to upsert into '{}'", self.name), e))?;

        info!("Upserted {} records into '{}'", records.len(), self.name);
        Ok(())
    }

    /// The `top_k` records closest to `embedding`, nearest first
    #[inline]
    pub async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<StoredHit>, RagError> {
        if embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                collection: self.name.clone(),
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        if top_k == 0 || self.count().await? == 0 {
            debug!("Skipping query against empty collection '{}'", self.name);
            return Ok(Vec::new());
        }

        let results = self
            .table
            .vector_search(embedding)
            .map_err(|e| store_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(self.metric.into())
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| store_error(&format!("Failed to query '{}'", self.name), e))?;

        let hits = parse_stream(results).await?;
        debug!("Collection '{}' returned {} hits", self.name, hits.len());
        Ok(hits)
    }

    /// Number of records stored in the collection
    #[inline]
    pub async fn count(&self) -> Result<usize, RagError> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| store_error(&format!("Failed to count rows in '{}'", self.name), e))
    }

    /// Number of records stored for one document
    #[inline]
    pub async fn count_source(&self, source_path: &str) -> Result<usize, RagError> {
        self.table
            .count_rows(Some(format!("source_path = {}", sql_literal(source_path))))
            .await
            .map_err(|e| store_error(&format!("Failed to count rows in '{}'", self.name), e))
    }

    /// Table version; every committed write advances it
    #[cfg(test)]
    pub(crate) async fn version(&self) -> Result<u64, RagError> {
        self.table
            .version()
            .await
            .map_err(|e| store_error(&format!("Failed to read version of '{}'", self.name), e))
    }

    /// Delete a document's chunks whose index is `from_index` or higher
    #[inline]
    pub async fn prune_source(&self, source_path: &str, from_index: u32) -> Result<(), RagError> {
        let predicate = format!(
            "source_path = {} AND chunk_index >= {}",
            sql_literal(source_path),
            from_index
        );
        debug!("Pruning '{}' where {}", self.name, predicate);

        self.table
            .delete(&predicate)
            .await
            .map_err(|e| store_error(&format!("Failed to prune '{}'", self.name), e))?;
        Ok(())
    }

    /// Delete every chunk of a document
    #[cfg(test)]
    pub(crate) async fn delete_source(&self, source_path: &str) -> Result<(), RagError> {
        self.prune_source(source_path, 0).await
    }

    /// Ids of the records stored for a document, sorted
    #[cfg(test)]
    pub(crate) async fn ids_for_source(&self, source_path: &str) -> Result<Vec<String>, RagError> {
        let results = self
            .table
            .query()
            .only_if(format!("source_path = {}", sql_literal(source_path)))
            .execute()
            .await
            .map_err(|e| store_error(&format!("Failed to scan '{}'", self.name), e))?;

        let mut ids: Vec<String> = parse_stream(results)
            .await?
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Create a RecordBatch from chunk records
    fn create_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch, RagError> {
        let len = records.len();
        let vector_dim = self.dimension;

        let mut ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut source_paths = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut chunk_counts = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut collections = Vec::with_capacity(len);
        let mut tags = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);

        for record in records {
            ids.push(record.id.as_str());
            texts.push(record.text.as_str());
            source_paths.push(record.metadata.source_path.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            chunk_counts.push(record.metadata.chunk_count);
            created_ats.push(record.metadata.created_at.as_str());
            collections.push(record.metadata.collection.as_str());
            tags.push(
                serde_json::to_string(&record.metadata.tags)
                    .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to encode tags: {}", e)))?,
            );
            flat_values.extend_from_slice(&record.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| store_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(source_paths)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(chunk_counts)),
            Arc::new(StringArray::from(created_ats)),
            Arc::new(StringArray::from(collections)),
            Arc::new(StringArray::from(tags)),
        ];

        RecordBatch::try_new(create_schema(vector_dim), arrays)
            .map_err(|e| store_error("Failed to create record batch", e))
    }
}

/// Collect every batch of a LanceDB result stream into hits
async fn parse_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<StoredHit>, RagError> {
    let mut hits = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| store_error("Failed to read result stream", e))?
    {
        hits.extend(parse_batch(&batch)?);
    }

    Ok(hits)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Invalid {} column type", name)))
}

/// Parse a single record batch; rows without a `_distance` column get distance 0
fn parse_batch(batch: &RecordBatch) -> Result<Vec<StoredHit>, RagError> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let source_paths = string_column(batch, "source_path")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let chunk_counts = u32_column(batch, "chunk_count")?;
    let created_ats = string_column(batch, "created_at")?;
    let collections = string_column(batch, "collection")?;
    let tags = string_column(batch, "tags")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let row_tags: BTreeMap<String, String> = serde_json::from_str(tags.value(row))
            .unwrap_or_else(|e| {
                warn!("Ignoring unreadable tags on '{}': {}", ids.value(row), e);
                BTreeMap::new()
            });

        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        hits.push(StoredHit {
            id: ids.value(row).to_string(),
            text: texts.value(row).to_string(),
            metadata: ChunkMetadata {
                source_path: source_paths.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                chunk_count: chunk_counts.value(row),
                created_at: created_ats.value(row).to_string(),
                collection: collections.value(row).to_string(),
                tags: row_tags,
            },
            distance,
        });
    }

    Ok(hits)
}

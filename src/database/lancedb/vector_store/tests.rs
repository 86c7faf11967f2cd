use super::*;
use tempfile::TempDir;

const DIM: usize = 4;

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), DIM, DistanceMetric::Cosine)
        .await
        .expect("should open vector store");
    (store, temp_dir)
}

fn metadata(collection: &str, source_path: &str, chunk_index: u32, chunk_count: u32) -> ChunkMetadata {
    ChunkMetadata {
        source_path: source_path.to_string(),
        chunk_index,
        chunk_count,
        created_at: "2024-01-01T00:00:00+00:00".to_string(),
        collection: collection.to_string(),
        tags: BTreeMap::new(),
    }
}

fn record(
    collection: &str,
    source_path: &str,
    chunk_index: u32,
    chunk_count: u32,
    vector: [f32; DIM],
    text: &str,
) -> ChunkRecord {
    ChunkRecord {
        id: crate::database::lancedb::record_id(source_path, chunk_index as usize),
        vector: vector.to_vec(),
        text: text.to_string(),
        metadata: metadata(collection, source_path, chunk_index, chunk_count),
    }
}

#[test]
fn sql_literal_escapes_quotes() {
    assert_eq!(sql_literal("plain"), "'plain'");
    assert_eq!(sql_literal("it's"), "'it''s'");
}

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let (store, _temp_dir) = create_test_store().await;

    assert!(store.list_collections().await.expect("should list").is_empty());
    assert!(store.collection("notes").await.expect("should look up").is_none());

    let first = store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");
    let second = store
        .get_or_create_collection("notes")
        .await
        .expect("should reopen collection");

    assert_eq!(first.name(), "notes");
    assert_eq!(second.name(), "notes");
    assert_eq!(store.list_collections().await.expect("should list"), vec!["notes"]);
    assert_eq!(second.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn invalid_collection_name_rejected() {
    let (store, _temp_dir) = create_test_store().await;

    let result = store.get_or_create_collection("no").await;
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[tokio::test]
async fn upsert_overwrites_existing_ids() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");

    collection
        .upsert(&[
            record("notes", "/a.md", 0, 2, [1.0, 0.0, 0.0, 0.0], "first"),
            record("notes", "/a.md", 1, 2, [0.0, 1.0, 0.0, 0.0], "second"),
        ])
        .await
        .expect("should insert");
    assert_eq!(collection.count().await.expect("should count"), 2);

    collection
        .upsert(&[record("notes", "/a.md", 0, 2, [0.0, 0.0, 1.0, 0.0], "rewritten")])
        .await
        .expect("should upsert");
    assert_eq!(collection.count().await.expect("should count"), 2);

    let hits = collection
        .query(&[0.0, 0.0, 1.0, 0.0], 1)
        .await
        .expect("should query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "/a.md:0");
    assert_eq!(hits[0].text, "rewritten");
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");

    let result = collection
        .upsert(&[
            record("notes", "/a.md", 0, 1, [1.0, 0.0, 0.0, 0.0], "one"),
            record("notes", "/a.md", 0, 1, [0.0, 1.0, 0.0, 0.0], "two"),
        ])
        .await;

    assert!(result.is_err());
    assert_eq!(collection.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn wrong_vector_length_is_dimension_mismatch() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");

    let mut bad = record("notes", "/a.md", 0, 1, [1.0, 0.0, 0.0, 0.0], "one");
    bad.vector.push(0.5);

    let result = collection.upsert(&[bad]).await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 4,
            actual: 5,
            ..
        })
    ));

    let result = collection.query(&[1.0, 0.0], 3).await;
    assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
}

#[tokio::test]
async fn reopening_with_other_dimension_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    let store = VectorStore::open(&path, DIM, DistanceMetric::Cosine)
        .await
        .expect("should open store");
    store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");
    drop(store);

    let store = VectorStore::open(&path, 8, DistanceMetric::Cosine)
        .await
        .expect("should reopen store");
    let result = store.collection("notes").await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 4,
            actual: 8,
            ..
        })
    ));
}

#[tokio::test]
async fn query_ranks_by_ascending_distance() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .insert(
            "notes",
            vec!["/a.md:0".to_string(), "/b.md:0".to_string(), "/c.md:0".to_string()],
            vec![
                vec![1.0, 0.0, 0.0, 0.0],
                vec![0.7, 0.7, 0.0, 0.0],
                vec![0.0, 0.0, 0.0, 1.0],
            ],
            vec!["exact".to_string(), "close".to_string(), "far".to_string()],
            vec![
                metadata("notes", "/a.md", 0, 1),
                metadata("notes", "/b.md", 0, 1),
                metadata("notes", "/c.md", 0, 1),
            ],
        )
        .await
        .expect("should insert");

    let hits = store
        .query("notes", &[1.0, 0.0, 0.0, 0.0], 10)
        .await
        .expect("should query");

    let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["exact", "close", "far"]);
    assert!(hits[0].distance.abs() < 1e-4);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert_eq!(hits[0].metadata.collection, "notes");

    let limited = store
        .query("notes", &[1.0, 0.0, 0.0, 0.0], 2)
        .await
        .expect("should query");
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn insert_requires_parallel_lengths() {
    let (store, _temp_dir) = create_test_store().await;

    let result = store
        .insert(
            "notes",
            vec!["/a.md:0".to_string()],
            vec![],
            vec!["text".to_string()],
            vec![metadata("notes", "/a.md", 0, 1)],
        )
        .await;

    assert!(result.is_err());
    assert!(store.collection("notes").await.expect("should look up").is_none());
}

#[tokio::test]
async fn empty_and_missing_collections_return_nothing() {
    let (store, _temp_dir) = create_test_store().await;

    let hits = store
        .query("never_created", &[1.0, 0.0, 0.0, 0.0], 5)
        .await
        .expect("missing collection should be empty");
    assert!(hits.is_empty());

    store
        .get_or_create_collection("empty_one")
        .await
        .expect("should create collection");
    let hits = store
        .query("empty_one", &[1.0, 0.0, 0.0, 0.0], 5)
        .await
        .expect("empty collection should be empty");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn prune_and_delete_source() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");

    collection
        .upsert(&[
            record("notes", "/a.md", 0, 3, [1.0, 0.0, 0.0, 0.0], "a0"),
            record("notes", "/a.md", 1, 3, [0.0, 1.0, 0.0, 0.0], "a1"),
            record("notes", "/a.md", 2, 3, [0.0, 0.0, 1.0, 0.0], "a2"),
            record("notes", "/it's.md", 0, 1, [0.0, 0.0, 0.0, 1.0], "quoted"),
        ])
        .await
        .expect("should insert");

    collection.prune_source("/a.md", 1).await.expect("should prune");
    assert_eq!(
        collection.ids_for_source("/a.md").await.expect("should scan"),
        vec!["/a.md:0"]
    );

    collection
        .delete_source("/it's.md")
        .await
        .expect("should delete quoted path");
    assert!(
        collection
            .ids_for_source("/it's.md")
            .await
            .expect("should scan")
            .is_empty()
    );
    assert_eq!(collection.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn tags_survive_round_trip() {
    let (store, _temp_dir) = create_test_store().await;
    let collection = store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");

    let mut tagged = record("notes", "/a.md", 0, 1, [1.0, 0.0, 0.0, 0.0], "tagged");
    tagged
        .metadata
        .tags
        .insert("persona".to_string(), "chen".to_string());
    collection.upsert(&[tagged]).await.expect("should insert");

    let hits = collection
        .query(&[1.0, 0.0, 0.0, 0.0], 1)
        .await
        .expect("should query");
    assert_eq!(
        hits[0].metadata.tags.get("persona").map(String::as_str),
        Some("chen")
    );
}

#[tokio::test]
async fn drop_collection_removes_table() {
    let (store, _temp_dir) = create_test_store().await;
    store
        .get_or_create_collection("notes")
        .await
        .expect("should create collection");

    assert!(store.drop_collection("notes").await.expect("should drop"));
    assert!(!store.drop_collection("notes").await.expect("should be a no-op"));
    assert!(store.list_collections().await.expect("should list").is_empty());
}

#[tokio::test]
async fn l2_metric_is_used_for_queries() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), DIM, DistanceMetric::L2)
        .await
        .expect("should open store");
    assert_eq!(store.metric(), DistanceMetric::L2);

    store
        .insert(
            "notes",
            vec!["/a.md:0".to_string(), "/b.md:0".to_string()],
            vec![vec![2.0, 0.0, 0.0, 0.0], vec![10.0, 0.0, 0.0, 0.0]],
            vec!["near".to_string(), "scaled".to_string()],
            vec![
                metadata("notes", "/a.md", 0, 1),
                metadata("notes", "/b.md", 0, 1),
            ],
        )
        .await
        .expect("should insert");

    // Cosine would tie these; Euclidean distance separates them.
    let hits = store
        .query("notes", &[1.0, 0.0, 0.0, 0.0], 2)
        .await
        .expect("should query");
    assert_eq!(hits[0].text, "near");
    assert!(hits[1].distance > hits[0].distance);
}

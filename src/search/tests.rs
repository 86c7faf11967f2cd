use std::collections::BTreeMap;

use super::*;
use crate::document::Document;
use crate::indexer::{ChangeDetector, IngestOptions, Indexer};
use crate::test_support::{StubEmbedder, TEST_DIMENSION, test_config};
use tempfile::TempDir;

fn result(collection: &str, id: &str, distance: f32) -> QueryResult {
    QueryResult {
        id: id.to_string(),
        text: format!("text of {}", id),
        metadata: ChunkMetadata {
            source_path: id.to_string(),
            chunk_index: 0,
            chunk_count: 1,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            collection: collection.to_string(),
            tags: BTreeMap::new(),
        },
        distance,
        collection: collection.to_string(),
    }
}

#[test]
fn merge_sorts_and_truncates() {
    let merged = merge_results(
        vec![
            vec![result("b_coll", "b1", 0.2), result("b_coll", "b2", 0.9)],
            vec![],
            vec![result("a_coll", "a1", 0.1), result("a_coll", "a2", 0.5)],
        ],
        3,
    );

    let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "b1", "a2"]);
    assert!(merged.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn merge_breaks_ties_by_collection_then_id() {
    let merged = merge_results(
        vec![
            vec![result("zeta", "z:0", 0.3), result("zeta", "a:0", 0.3)],
            vec![result("alpha", "y:0", 0.3)],
        ],
        10,
    );

    let order: Vec<(&str, &str)> = merged
        .iter()
        .map(|r| (r.collection.as_str(), r.id.as_str()))
        .collect();
    assert_eq!(order, vec![("alpha", "y:0"), ("zeta", "a:0"), ("zeta", "z:0")]);
}

#[test]
fn merge_with_fewer_results_than_top_k() {
    let merged = merge_results(vec![vec![result("alpha", "a", 0.4)]], 5);
    assert_eq!(merged.len(), 1);

    assert!(merge_results(vec![vec![result("alpha", "a", 0.4)]], 0).is_empty());
}

#[test]
fn similarity_filter_is_opt_in() {
    let results = vec![
        result("alpha", "close", 0.1),
        result("alpha", "edge", 0.3),
        result("alpha", "far", 0.8),
    ];

    let kept = filter_by_similarity(results.clone(), 0.7);
    let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["close", "edge"]);

    assert_eq!(filter_by_similarity(results, -1.0).len(), 3);
}

struct Pipeline {
    indexer: Indexer,
    searcher: Searcher,
    database: Database,
    _temp_dir: TempDir,
}

async fn pipeline() -> Pipeline {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path());
    let embedder: Arc<dyn Embedder> = StubEmbedder::shared();
    let vector_store = Arc::new(
        VectorStore::open(
            &config.vector_database_path(),
            TEST_DIMENSION,
            config.search.distance_metric,
        )
        .await
        .expect("should open store"),
    );
    let database = Database::initialize_in_dir(&config.storage_dir())
        .await
        .expect("should open database");

    Pipeline {
        indexer: Indexer::new(
            Arc::clone(&embedder),
            Arc::clone(&vector_store),
            ChangeDetector::new(Some(database.clone())),
            &config,
        ),
        searcher: Searcher::new(embedder, vector_store, Some(database.clone()), &config),
        database,
        _temp_dir: temp_dir,
    }
}

async fn ingest(pipeline: &Pipeline, path: &str, text: &str, collection: &str) {
    pipeline
        .indexer
        .ingest_document(
            &Document::from_text(path, text),
            collection,
            &IngestOptions::default(),
        )
        .await
        .expect("should ingest");
}

#[tokio::test]
async fn professor_chen_is_found_in_persona_memories() {
    let pipeline = pipeline().await;
    ingest(
        &pipeline,
        "/notes/chen.md",
        "Professor Chen discusses trauma healing techniques used in therapy sessions.",
        "persona_memories",
    )
    .await;
    ingest(
        &pipeline,
        "/notes/harbor.md",
        "The harbor town celebrates the lantern festival every autumn.",
        "creative_hub_main",
    )
    .await;

    let response = pipeline
        .searcher
        .search("Professor Chen trauma healing", 5)
        .await
        .expect("should search");

    assert!(response.results.len() <= 5);
    assert!(response.skipped.is_empty());
    let chen = response
        .results
        .iter()
        .find(|r| r.id == "/notes/chen.md:0")
        .expect("chen chunk should be returned");
    assert_eq!(chen.collection, "persona_memories");
    assert_eq!(response.results[0].id, "/notes/chen.md:0");
}

#[tokio::test]
async fn identical_text_has_near_zero_distance() {
    let pipeline = pipeline().await;
    let text = "The cartographer mapped the floating islands by starlight.";
    ingest(&pipeline, "/notes/map.md", text, "creative_hub_main").await;
    ingest(
        &pipeline,
        "/notes/other.md",
        "Completely unrelated grocery list: eggs, flour, butter.",
        "creative_hub_main",
    )
    .await;

    let response = pipeline.searcher.search(text, 5).await.expect("should search");

    assert_eq!(response.results[0].id, "/notes/map.md:0");
    assert!(response.results[0].distance.abs() < 1e-4);
    assert!(
        response
            .results
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance)
    );
}

#[tokio::test]
async fn empty_collection_does_not_affect_others() {
    let pipeline = pipeline().await;
    ingest(
        &pipeline,
        "/notes/a.md",
        "dragons guard the mountain pass",
        "creative_hub_main",
    )
    .await;

    let response = pipeline
        .searcher
        .search("dragons mountain", 5)
        .await
        .expect("empty persona_memories should not fail");

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].collection, "creative_hub_main");

    let only_empty = pipeline
        .searcher
        .search_collections("dragons", 5, &["persona_memories".to_string()])
        .await
        .expect("should search");
    assert!(only_empty.results.is_empty());
    assert!(only_empty.skipped.is_empty());
}

#[tokio::test]
async fn unconfigured_collection_is_skipped_and_reported() {
    let pipeline = pipeline().await;
    ingest(
        &pipeline,
        "/notes/a.md",
        "dragons guard the mountain pass",
        "creative_hub_main",
    )
    .await;
    ingest(
        &pipeline,
        "/notes/b.md",
        "dragons in a scratch collection",
        "scratchpad",
    )
    .await;

    let response = pipeline
        .searcher
        .search_collections(
            "dragons",
            5,
            &["scratchpad".to_string(), "creative_hub_main".to_string()],
        )
        .await
        .expect("should search");

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].collection, "creative_hub_main");
    assert_eq!(response.skipped.len(), 1);
    assert_eq!(response.skipped[0].name, "scratchpad");
    assert!(response.skipped[0].reason.contains("scratchpad"));

    let default_search = pipeline
        .searcher
        .search("dragons", 5)
        .await
        .expect("should search");
    assert!(
        default_search
            .results
            .iter()
            .all(|r| r.collection != "scratchpad")
    );
}

#[tokio::test]
async fn results_are_truncated_across_collections() {
    let pipeline = pipeline().await;
    for i in 0..4 {
        ingest(
            &pipeline,
            &format!("/main/{}.md", i),
            &format!("river story number {}", i),
            "creative_hub_main",
        )
        .await;
        ingest(
            &pipeline,
            &format!("/persona/{}.md", i),
            &format!("river memory number {}", i),
            "persona_memories",
        )
        .await;
    }

    let response = pipeline
        .searcher
        .search("river", 3)
        .await
        .expect("should search");

    assert_eq!(response.results.len(), 3);
    assert!(
        response
            .results
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance)
    );
}

#[tokio::test]
async fn searches_are_recorded_in_history() {
    let pipeline = pipeline().await;
    ingest(&pipeline, "/notes/a.md", "harbor lights", "creative_hub_main").await;

    pipeline
        .searcher
        .search("harbor", 5)
        .await
        .expect("should search");

    let history = pipeline
        .database
        .recent_searches(10)
        .await
        .expect("should read history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].query, "harbor");
    assert_eq!(history[0].result_count, 1);
    assert_eq!(
        history[0].collection_names(),
        vec!["creative_hub_main", "persona_memories"]
    );
}

#[tokio::test]
async fn history_failure_does_not_fail_search() {
    let pipeline = pipeline().await;
    ingest(&pipeline, "/notes/a.md", "harbor lights", "creative_hub_main").await;
    pipeline.database.close().await;

    let response = pipeline
        .searcher
        .search("harbor", 5)
        .await
        .expect("search should succeed without history");
    assert_eq!(response.results.len(), 1);
}

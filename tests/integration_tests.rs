//! End-to-end tests for the indexed knowledge core: scan, search, upsert
//! coherence and re-ingest shrinkage against the SQLite backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use scriptorium::{
    Chunker, DocumentChunk, Embedder, FileExtractor, IngestCoordinator, MockEmbedder, QueryCache,
    SearchQuery, SearchService, SqliteVectorStore, VectorStore,
};
use tempfile::TempDir;

const DIM: usize = 64;

struct TestEnv {
    store: Arc<SqliteVectorStore>,
    embedder: Arc<MockEmbedder>,
    coordinator: IngestCoordinator,
}

fn setup_test_env() -> TestEnv {
    let store = Arc::new(SqliteVectorStore::in_memory().expect("sqlite init"));
    let embedder = Arc::new(MockEmbedder::with_dimension(DIM));
    let coordinator = IngestCoordinator::new(
        store.clone(),
        embedder.clone(),
        Arc::new(FileExtractor::default()),
        QueryCache::disabled(),
        Chunker::new(300, 60),
        2,
    );
    TestEnv {
        store,
        embedder,
        coordinator,
    }
}

#[tokio::test]
async fn test_scan_then_search_round_trip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("harbour.md"),
        "# Harbour\n\nThe fishing boats returned before the storm broke over the harbour.",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("library.md"),
        "# Library\n\nShe catalogued the manuscripts by candlelight in the old library.",
    )
    .unwrap();

    let env = setup_test_env();
    let report = env.coordinator.scan(dir.path(), &[], &[]).await.unwrap();
    assert_eq!(report.documents, 2);
    assert!(!report.aborted);

    let service = SearchService::new(env.store.clone(), env.embedder.clone(), QueryCache::disabled());
    let results = service
        .search(&SearchQuery::new("boats before the storm").with_top_k(2))
        .await
        .unwrap();
    assert!(!results.is_empty());
    for window in results.windows(2) {
        assert!(window[0].score() >= window[1].score());
    }
}

#[tokio::test]
async fn test_upsert_same_ids_is_idempotent() {
    let env = setup_test_env();

    let mut chunks = Vec::new();
    for index in 0..3 {
        let mut metadata = BTreeMap::new();
        metadata.insert("chunk_index".to_string(), serde_json::json!(index));
        metadata.insert("total_chunks".to_string(), serde_json::json!(3));
        let chunk = DocumentChunk::new("/m/a.txt", index, 3, format!("span {}", index), metadata);
        let vector = env.embedder.embed(chunk.content()).await.unwrap();
        chunks.push(chunk.with_embedding(vector));
    }

    env.store.add(&chunks).await.unwrap();
    env.store.add(&chunks).await.unwrap();
    assert_eq!(env.store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_delete_by_source_is_complete_and_exact() {
    let env = setup_test_env();

    let mut chunks = Vec::new();
    for (source, index) in [("/m/a.txt", 0), ("/m/a.txt", 1), ("/m/b.txt", 0)] {
        let mut metadata = BTreeMap::new();
        metadata.insert("chunk_index".to_string(), serde_json::json!(index));
        metadata.insert("total_chunks".to_string(), serde_json::json!(1));
        let chunk = DocumentChunk::new(source, index, 1, format!("{} {}", source, index), metadata);
        let vector = env.embedder.embed(chunk.content()).await.unwrap();
        chunks.push(chunk.with_embedding(vector));
    }
    env.store.add(&chunks).await.unwrap();

    let removed = env.store.delete_by_source("/m/a.txt").await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(env.store.count().await.unwrap(), 1);

    // Prefix matches must not be touched.
    let removed_again = env.store.delete_by_source("/m/a").await.unwrap();
    assert_eq!(removed_again, 0);
}

#[tokio::test]
async fn test_reingest_shorter_file_shrinks_collection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chapter.txt");
    std::fs::write(&path, "one long sentence here. ".repeat(60)).unwrap();

    let env = setup_test_env();
    env.coordinator.ingest_file(&path).await.unwrap();
    let before = env.store.count().await.unwrap();
    assert!(before > 1);

    std::fs::write(&path, "a single short line.").unwrap();
    env.coordinator.ingest_file(&path).await.unwrap();
    assert_eq!(env.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_mixed_tree_classifies_and_skips() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), "plain prose body").unwrap();
    std::fs::write(dir.path().join("tool.py"), "def run():\n    return 1\n").unwrap();
    std::fs::write(dir.path().join("photo.png"), [0x89u8, 0x50, 0x4E, 0x47]).unwrap();

    let env = setup_test_env();
    let report = env.coordinator.scan(dir.path(), &[], &[]).await.unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.by_type.get("text"), Some(&1));
    assert_eq!(report.by_type.get("code"), Some(&1));
    // Unclassifiable binaries never enter the candidate list.
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_dimension_mismatch_is_hard_error() {
    let env = setup_test_env();

    let mut metadata = BTreeMap::new();
    metadata.insert("chunk_index".to_string(), serde_json::json!(0));
    metadata.insert("total_chunks".to_string(), serde_json::json!(1));
    let seeded = DocumentChunk::new("/m/a.txt", 0, 1, "first", metadata.clone());
    let vector = env.embedder.embed("first").await.unwrap();
    env.store.add(&[seeded.with_embedding(vector)]).await.unwrap();

    let wrong = DocumentChunk::new("/m/b.txt", 0, 1, "second", metadata)
        .with_embedding(vec![0.5; DIM + 1]);
    let result = env.store.add(&[wrong]).await;
    assert!(matches!(
        result,
        Err(scriptorium::DomainError::DimensionMismatch(_))
    ));
    // The failed batch must not have written anything.
    assert_eq!(env.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_search_scores_are_banded_and_bounded() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("scene.txt"),
        "the bell tower rang at midnight over the sleeping town.",
    )
    .unwrap();

    let env = setup_test_env();
    env.coordinator.scan(dir.path(), &[], &[]).await.unwrap();

    let service = SearchService::new(env.store, env.embedder, QueryCache::disabled());
    let results = service
        .search(&SearchQuery::new("the bell tower rang at midnight over the sleeping town."))
        .await
        .unwrap();

    assert!(!results.is_empty());
    for result in &results {
        assert!(result.score() >= 0.0 && result.score() <= 1.0);
        let band = result.relevance().as_str();
        assert!(["high", "medium", "low"].contains(&band));
    }
}

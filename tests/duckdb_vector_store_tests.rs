use std::collections::BTreeMap;
use std::sync::Arc;

use scriptorium::{DocumentChunk, DuckDbVectorStore, VectorStore};
use tempfile::tempdir;

const DIM: usize = 8;

fn unit_vector(hot_index: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[hot_index] = 1.0;
    v
}

fn chunk(source: &str, index: usize, content: &str, hot: usize) -> DocumentChunk {
    let mut metadata = BTreeMap::new();
    metadata.insert("chunk_index".to_string(), serde_json::json!(index));
    metadata.insert("total_chunks".to_string(), serde_json::json!(1));
    DocumentChunk::new(source, index, 1, content, metadata).with_embedding(unit_vector(hot))
}

#[tokio::test]
async fn duckdb_store_can_add_and_search() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(
        DuckDbVectorStore::new(&dir.path().join("vectors.duckdb"), DIM).expect("duckdb init"),
    );

    let seeded = chunk("/m/ch1.md", 0, "the tide rose over the pier", 0);
    store.add(std::slice::from_ref(&seeded)).await.expect("add");

    let results = store.search(&unit_vector(0), 3).await.expect("search");
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk().id(), seeded.id());
    assert!(results[0].score() > 0.99, "expected near-identical score");
}

#[tokio::test]
async fn duckdb_store_upsert_by_id_does_not_duplicate() {
    let dir = tempdir().expect("tempdir");
    let store =
        DuckDbVectorStore::new(&dir.path().join("vectors.duckdb"), DIM).expect("duckdb init");

    let seeded = chunk("/m/ch1.md", 0, "same content", 1);
    store.add(std::slice::from_ref(&seeded)).await.expect("add");
    store.add(std::slice::from_ref(&seeded)).await.expect("re-add");

    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn duckdb_store_delete_by_source_removes_all() {
    let dir = tempdir().expect("tempdir");
    let store =
        DuckDbVectorStore::new(&dir.path().join("vectors.duckdb"), DIM).expect("duckdb init");

    store
        .add(&[
            chunk("/m/a.md", 0, "first span", 0),
            chunk("/m/a.md", 1, "second span", 1),
            chunk("/m/b.md", 0, "other file", 2),
        ])
        .await
        .expect("add");

    let removed = store.delete_by_source("/m/a.md").await.expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(store.count().await.expect("count"), 1);

    let results = store.search(&unit_vector(2), 5).await.expect("search");
    assert!(results.iter().all(|r| r.chunk().source() == "/m/b.md"));
}

#[tokio::test]
async fn duckdb_store_rejects_wrong_dimension() {
    let dir = tempdir().expect("tempdir");
    let store =
        DuckDbVectorStore::new(&dir.path().join("vectors.duckdb"), DIM).expect("duckdb init");

    let mut metadata = BTreeMap::new();
    metadata.insert("chunk_index".to_string(), serde_json::json!(0));
    let wrong = DocumentChunk::new("/m/a.md", 0, 1, "bad vector", metadata)
        .with_embedding(vec![1.0; DIM + 3]);

    let result = store.add(&[wrong]).await;
    assert!(matches!(
        result,
        Err(scriptorium::DomainError::DimensionMismatch(_))
    ));
}

#[tokio::test]
async fn duckdb_store_clear_empties_collection() {
    let dir = tempdir().expect("tempdir");
    let store =
        DuckDbVectorStore::new(&dir.path().join("vectors.duckdb"), DIM).expect("duckdb init");

    store
        .add(&[chunk("/m/a.md", 0, "span", 0)])
        .await
        .expect("add");
    store.clear().await.expect("clear");
    assert_eq!(store.count().await.expect("count"), 0);
    assert!(store.test_connection().await);
}

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::VectorStore;
use crate::domain::{sort_results, DocumentChunk, DomainError, SearchResult};

/// Relational fallback backend: one SQLite table, embeddings stored as JSON,
/// cosine similarity computed in-process over a full scan. Intended for
/// small corpora and tests; degrades linearly with collection size.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    // Recorded on first add and enforced on every write thereafter.
    dimension: Mutex<Option<usize>>,
}

impl SqliteVectorStore {
    pub fn new(db_path: &Path) -> Result<Self, DomainError> {
        let conn = Connection::open(db_path)
            .map_err(|e| DomainError::backend_unavailable(format!("Failed to open database: {}", e)))?;
        Self::initialize(&conn)?;
        let dimension = Self::existing_dimension(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension: Mutex::new(dimension),
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DomainError::backend_unavailable(format!("Failed to create in-memory database: {}", e))
        })?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension: Mutex::new(None),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), DomainError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS document_vectors (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding TEXT NOT NULL,
                metadata TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_document_source ON document_vectors(source);
            "#,
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize schema: {}", e)))?;
        debug!("SQLite document_vectors schema initialized");
        Ok(())
    }

    /// Dimension of any persisted row, so reopened stores keep enforcing it.
    fn existing_dimension(conn: &Connection) -> Result<Option<usize>, DomainError> {
        let row: Option<String> = conn
            .query_row("SELECT embedding FROM document_vectors LIMIT 1", [], |row| {
                row.get(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(DomainError::storage(format!("Failed to probe dimension: {}", other))),
            })?;
        match row {
            Some(json) => {
                let vector: Vec<f32> = serde_json::from_str(&json)
                    .map_err(|e| DomainError::storage(format!("Corrupt embedding row: {}", e)))?;
                Ok(Some(vector.len()))
            }
            None => Ok(None),
        }
    }

    async fn check_dimension(&self, len: usize) -> Result<(), DomainError> {
        let mut guard = self.dimension.lock().await;
        match *guard {
            Some(expected) if expected != len => Err(DomainError::dimension_mismatch(format!(
                "Collection dimension is {}, got {}",
                expected, len
            ))),
            Some(_) => Ok(()),
            None => {
                *guard = Some(len);
                Ok(())
            }
        }
    }

    fn row_to_chunk(
        id: String,
        content: String,
        metadata_json: String,
        source: String,
        created_at: String,
    ) -> DocumentChunk {
        let metadata: BTreeMap<String, Value> =
            serde_json::from_str(&metadata_json).unwrap_or_default();
        let chunk_index = metadata
            .get("chunk_index")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let total_chunks = metadata
            .get("total_chunks")
            .and_then(Value::as_u64)
            .unwrap_or(1) as usize;
        DocumentChunk::reconstitute(
            id,
            source,
            chunk_index,
            total_chunks,
            content,
            metadata,
            None,
            created_at,
        )
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<(), DomainError> {
        if chunks.is_empty() {
            return Ok(());
        }

        for chunk in chunks {
            let embedding = chunk.embedding().ok_or_else(|| {
                DomainError::invalid_input(format!("Chunk {} has no embedding", chunk.id()))
            })?;
            self.check_dimension(embedding.len()).await?;
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO document_vectors \
                     (id, content, embedding, metadata, source, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| DomainError::storage(format!("Failed to prepare insert: {}", e)))?;

            for chunk in chunks {
                let embedding_json = serde_json::to_string(chunk.embedding().unwrap_or_default())
                    .map_err(|e| DomainError::storage(format!("Failed to encode embedding: {}", e)))?;
                let metadata_json = serde_json::to_string(chunk.metadata())
                    .map_err(|e| DomainError::storage(format!("Failed to encode metadata: {}", e)))?;
                stmt.execute(params![
                    chunk.id(),
                    chunk.content(),
                    embedding_json,
                    metadata_json,
                    chunk.source(),
                    chunk.created_at(),
                ])
                .map_err(|e| {
                    DomainError::storage(format!("Failed to insert chunk {}: {}", chunk.id(), e))
                })?;
            }
        }
        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Upserted {} chunks into SQLite store", chunks.len());
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        {
            let guard = self.dimension.lock().await;
            if let Some(expected) = *guard {
                if expected != query_embedding.len() {
                    return Err(DomainError::invalid_input(format!(
                        "Query dimension {} does not match collection dimension {}",
                        query_embedding.len(),
                        expected
                    )));
                }
            }
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, content, embedding, metadata, source, created_at FROM document_vectors")
            .map_err(|e| DomainError::storage(format!("Failed to prepare scan: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| DomainError::storage(format!("Failed to scan rows: {}", e)))?;

        let mut results = Vec::new();
        for row in rows {
            let (id, content, embedding_json, metadata_json, source, created_at) =
                row.map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?;
            let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
                .map_err(|e| DomainError::storage(format!("Corrupt embedding for {}: {}", id, e)))?;
            let score = cosine_similarity(query_embedding, &embedding);
            let chunk = Self::row_to_chunk(id, content, metadata_json, source, created_at);
            results.push(SearchResult::new(chunk, score));
        }

        sort_results(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM document_vectors WHERE source = ?1",
                params![source],
            )
            .map_err(|e| DomainError::storage(format!("Failed to delete by source: {}", e)))?;
        debug!("Deleted {} chunks for source {}", deleted, source);
        Ok(deleted as u64)
    }

    async fn test_connection(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM document_vectors", [], |row| row.get(0))
            .map_err(|e| DomainError::storage(format!("Failed to count chunks: {}", e)))?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM document_vectors", [])
            .map_err(|e| DomainError::storage(format!("Failed to clear collection: {}", e)))?;
        let mut guard = self.dimension.lock().await;
        *guard = None;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_opposite_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }
}

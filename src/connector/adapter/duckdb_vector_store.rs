use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::VectorStore;
use crate::domain::{DocumentChunk, DomainError, SearchResult};

/// Embedded document store backend: DuckDB with the VSS extension, cosine
/// HNSW index, score = 1 - distance.
pub struct DuckDbVectorStore {
    conn: Arc<Mutex<Connection>>,
    dimension: usize,
}

impl DuckDbVectorStore {
    pub fn new(path: &Path, dimension: usize) -> Result<Self, DomainError> {
        let conn = Connection::open(path).map_err(|e| {
            DomainError::backend_unavailable(format!("Failed to open DuckDB database: {}", e))
        })?;
        Self::initialize(&conn, dimension)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
        })
    }

    pub fn in_memory(dimension: usize) -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DomainError::backend_unavailable(format!("Failed to open DuckDB in-memory DB: {}", e))
        })?;
        Self::initialize(&conn, dimension)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
        })
    }

    fn initialize(conn: &Connection, dimension: usize) -> Result<(), DomainError> {
        debug!("Initializing DuckDB document store (dimension {})", dimension);
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS document_vectors (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding FLOAT[{dim}] NOT NULL,
                metadata TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_document_source ON document_vectors(source);",
            dim = dimension
        );
        conn.execute_batch(&create_table)
            .map_err(|e| DomainError::storage(format!("Failed to initialize DuckDB tables: {}", e)))?;

        // The HNSW index needs the VSS extension; without it queries fall
        // back to an exact scan, still through array_cosine_distance.
        let hnsw = conn
            .execute_batch("INSTALL vss; LOAD vss;")
            .and_then(|_| conn.execute_batch("SET hnsw_enable_experimental_persistence = true;"))
            .and_then(|_| {
                conn.execute_batch(
                    "CREATE INDEX IF NOT EXISTS document_hnsw_idx ON document_vectors \
                     USING HNSW (embedding) WITH (metric = 'cosine');",
                )
            });
        if let Err(e) = hnsw {
            warn!("VSS extension unavailable, using exact scan: {}", e);
        }

        Ok(())
    }

    fn vector_to_array_literal(&self, vector: &[f32]) -> Result<String, DomainError> {
        if vector.len() != self.dimension {
            return Err(DomainError::dimension_mismatch(format!(
                "Collection dimension is {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        let mut s = String::with_capacity(vector.len() * 8);
        s.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&format!("{}", v));
        }
        s.push(']');
        s.push_str(&format!("::FLOAT[{}]", self.dimension));
        Ok(s)
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

#[async_trait]
impl VectorStore for DuckDbVectorStore {
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<(), DomainError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        for chunk in chunks {
            let embedding = chunk.embedding().ok_or_else(|| {
                DomainError::invalid_input(format!("Chunk {} has no embedding", chunk.id()))
            })?;
            let array_lit = self.vector_to_array_literal(embedding)?;
            let metadata_json = serde_json::to_string(chunk.metadata())
                .map_err(|e| DomainError::storage(format!("Failed to encode metadata: {}", e)))?;
            // The array literal must be inlined: DuckDB FLOAT[N] does not
            // support parameter binding. It is built from our own floats.
            let sql = format!(
                "INSERT OR REPLACE INTO document_vectors \
                 (id, content, embedding, metadata, source, created_at) \
                 VALUES (?, ?, {}, ?, ?, ?)",
                array_lit
            );
            tx.execute(
                &sql,
                params![
                    chunk.id(),
                    chunk.content(),
                    metadata_json,
                    chunk.source(),
                    chunk.created_at(),
                ],
            )
            .map_err(|e| {
                DomainError::storage(format!("Failed to insert chunk {}: {}", chunk.id(), e))
            })?;
        }

        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;
        debug!("Upserted {} chunks into DuckDB store", chunks.len());
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let array_lit = self.vector_to_array_literal(query_embedding)?;
        let sql = format!(
            "SELECT id, content, metadata, source, created_at, \
                1.0 - array_cosine_distance(embedding, {array_lit}) AS score \
             FROM document_vectors \
             ORDER BY array_cosine_distance(embedding, {array_lit}) \
             LIMIT ?",
            array_lit = array_lit
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare search: {}", e)))?;
        let mut rows = stmt
            .query(params![top_k as i64])
            .map_err(|e| DomainError::storage(format!("Failed to run search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DomainError::storage(format!("Failed to read id: {}", e)))?;
            let content: String = row
                .get(1)
                .map_err(|e| DomainError::storage(format!("Failed to read content: {}", e)))?;
            let metadata_json: String = row
                .get(2)
                .map_err(|e| DomainError::storage(format!("Failed to read metadata: {}", e)))?;
            let source: String = row
                .get(3)
                .map_err(|e| DomainError::storage(format!("Failed to read source: {}", e)))?;
            let created_at: String = row
                .get(4)
                .map_err(|e| DomainError::storage(format!("Failed to read created_at: {}", e)))?;
            let score: f32 = row
                .get(5)
                .map_err(|e| DomainError::storage(format!("Failed to read score: {}", e)))?;

            let chunk = Self::row_to_chunk(id, content, metadata_json, source, created_at);
            results.push(SearchResult::new(chunk, score));
        }
        Ok(results)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM document_vectors WHERE source = ?",
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
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "duckdb"
    }
}

use async_trait::async_trait;

use crate::domain::{DocumentChunk, DomainError, SearchResult};

/// Persists `(id, vector, metadata)` tuples and answers nearest-neighbour
/// queries. All backends share upsert-by-id, exact-match delete-by-source
/// and `score = 1 - cosine distance` semantics.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upserts chunks by id. Every chunk must carry an embedding whose
    /// dimension matches the collection; a mismatch is a hard
    /// `DimensionMismatch` failure.
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<(), DomainError>;

    /// Returns up to `top_k` results in descending score order.
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;

    /// Removes every chunk whose `source` equals the argument.
    /// Returns the number of chunks removed.
    async fn delete_by_source(&self, source: &str) -> Result<u64, DomainError>;

    async fn test_connection(&self) -> bool;

    async fn count(&self) -> Result<u64, DomainError>;

    /// Full-collection reset.
    async fn clear(&self) -> Result<(), DomainError>;

    fn kind(&self) -> &'static str;
}

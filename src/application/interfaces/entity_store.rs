use async_trait::async_trait;

use crate::domain::{DomainError, Entity};

/// Persistence for the project manifest's entity rows.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Upserts entities by their deterministic id.
    async fn upsert_batch(&self, entities: &[Entity]) -> Result<(), DomainError>;

    /// Removes every entity extracted from the given file.
    /// Returns the number of entities removed.
    async fn delete_by_source(&self, file_path: &str) -> Result<u64, DomainError>;

    async fn find_by_source(&self, file_path: &str) -> Result<Vec<Entity>, DomainError>;

    async fn find_by_kind(&self, kind: &str) -> Result<Vec<Entity>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;
}

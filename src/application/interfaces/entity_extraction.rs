use std::path::Path;

use async_trait::async_trait;

use crate::domain::{DomainError, Entity};

/// Extracts structural entities (definitions, headings, config keys, terms)
/// from one file.
#[async_trait]
pub trait EntityExtraction: Send + Sync {
    async fn extract_entities(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<Vec<Entity>, DomainError>;

    fn supports(&self, path: &Path) -> bool;
}

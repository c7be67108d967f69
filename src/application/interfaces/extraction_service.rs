use std::path::Path;

use async_trait::async_trait;

use crate::domain::{DomainError, ExtractedDocument};

/// Turns a file into its canonical text body plus metadata.
///
/// Failures are soft: the caller skips the file, logs it and moves on.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, DomainError>;
}

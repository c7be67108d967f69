use async_trait::async_trait;

use crate::domain::DomainError;

/// Maps text to a fixed-dimension vector. Implementations are remote or
/// model-bound; the core treats them opaquely.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Whether the provider can currently serve requests.
    async fn ready(&self) -> bool;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// The provider-declared vector dimension; constant per collection.
    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

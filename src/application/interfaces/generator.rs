use async_trait::async_trait;

use crate::domain::DomainError;

/// Answer synthesis over retrieved context. Optional capability; the core
/// only defines the contract boundary.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, DomainError>;

    fn name(&self) -> &str;
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, SizeLimits};

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_generation_model() -> String {
    "llama3.2".to_string()
}

fn default_vector_db() -> String {
    "duckdb".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_max_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cpus + 4).min(32)
}

fn default_cache_host() -> String {
    "localhost".to_string()
}

fn default_cache_port() -> u16 {
    6379
}

/// Backend-specific settings for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Database file for the duckdb and sqlite backends.
    pub path: PathBuf,
    pub collection: String,
    /// Qdrant endpoint.
    pub endpoint: String,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("scriptorium.db"),
            collection: "documents".to_string(),
            endpoint: "http://localhost:6333".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub db: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_cache_host(),
            port: default_cache_port(),
            db: 0,
        }
    }
}

/// Top-level configuration, loaded from TOML with every key optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    #[serde(default = "default_vector_db")]
    pub vector_db: String,
    #[serde(default)]
    pub vector_db_config: VectorDbConfig,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub size_limits: SizeLimits,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            ollama_url: default_ollama_url(),
            generation_model: default_generation_model(),
            vector_db: default_vector_db(),
            vector_db_config: VectorDbConfig::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_workers: default_max_workers(),
            cache: CacheConfig::default(),
            size_limits: SizeLimits::default(),
        }
    }
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let body = std::fs::read_to_string(path)?;
        Self::parse(&body)
    }

    pub fn parse(body: &str) -> Result<Self, DomainError> {
        let config: Self = toml::from_str(body)
            .map_err(|e| DomainError::invalid_input(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::invalid_input(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        match self.vector_db.as_str() {
            "duckdb" | "qdrant" | "sqlite" => {}
            other => {
                return Err(DomainError::invalid_input(format!(
                    "Unknown vector_db '{}', expected duckdb, qdrant or sqlite",
                    other
                )))
            }
        }
        match self.embedding_provider.as_str() {
            "ollama" | "mock" => Ok(()),
            other => Err(DomainError::invalid_input(format!(
                "Unknown embedding_provider '{}', expected ollama or mock",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CoreConfig::parse("").unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.vector_db, "duckdb");
        assert_eq!(config.embedding_provider, "ollama");
        assert!(config.cache.enabled);
        assert!(config.max_workers >= 1 && config.max_workers <= 32);
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = CoreConfig::parse(
            r#"
            vector_db = "sqlite"
            chunk_size = 500
            chunk_overlap = 100

            [vector_db_config]
            path = "index.db"

            [cache]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.vector_db, "sqlite");
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.vector_db_config.path, PathBuf::from("index.db"));
        assert_eq!(config.vector_db_config.collection, "documents");
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let result = CoreConfig::parse("chunk_size = 100\nchunk_overlap = 100\n");
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = CoreConfig::parse("vector_db = \"pinecone\"\n");
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }
}

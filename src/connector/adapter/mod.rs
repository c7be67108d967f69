mod duckdb_vector_store;
mod entity_extractor;
mod fs_watcher;
mod mock_embedder;
mod ollama_client;
mod qdrant_vector_store;
mod redis_cache;
mod sqlite_entity_store;
mod sqlite_vector_store;

pub use duckdb_vector_store::*;
pub use entity_extractor::*;
pub use fs_watcher::*;
pub use mock_embedder::*;
pub use ollama_client::*;
pub use qdrant_vector_store::*;
pub use redis_cache::*;
pub use sqlite_entity_store::*;
pub use sqlite_vector_store::*;

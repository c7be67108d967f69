//! # Connector Layer
//!
//! External integrations implementing the application interfaces:
//! - Vector storage (DuckDB VSS, Qdrant over REST, SQLite fallback)
//! - Embedding and generation (Ollama, deterministic mock)
//! - Extraction (file-type-dispatched text pipeline)
//! - Filesystem watching and the Redis query cache

pub mod adapter;
pub mod extract;

pub use adapter::*;
pub use extract::*;

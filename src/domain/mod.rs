mod error;
pub mod models;
pub mod services;

pub use error::DomainError;
pub use models::{
    chunk_id, classify, entity_id, language_for, sort_results, ContentType, DocumentChunk, Entity,
    EntityKind, EventKind, ExtractedDocument, FileEvent, Relevance, ScanError, ScanReport,
    SearchQuery, SearchResult, SizeLimits,
};
pub use services::{clean_text, Chunker};

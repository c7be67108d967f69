pub mod application;
pub mod config;
pub mod connector;
pub mod domain;

pub use application::{
    AnswerQuery, CoreStats, Embedder, EntityExtraction, EntityStore, ExtractionService, Generator,
    IngestCoordinator, ManifestIndexer, RagResponse, SearchService, VectorStore,
};

pub use config::{CacheConfig, CoreConfig, VectorDbConfig};

pub use connector::{
    DuckDbVectorStore, FileExtractor, FileWatcher, MockEmbedder, OllamaEmbedder, OllamaGenerator,
    QdrantVectorStore, QueryCache, SqliteEntityStore, SqliteVectorStore,
    StructuralEntityExtractor,
};

pub use domain::{
    Chunker, ContentType, DocumentChunk, DomainError, Entity, EntityKind, EventKind,
    ExtractedDocument, FileEvent, Relevance, ScanReport, SearchQuery, SearchResult, SizeLimits,
};

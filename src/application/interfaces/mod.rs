mod embedder;
mod entity_extraction;
mod entity_store;
mod extraction_service;
mod generator;
mod vector_store;

pub use embedder::Embedder;
pub use entity_extraction::EntityExtraction;
pub use entity_store::EntityStore;
pub use extraction_service::ExtractionService;
pub use generator::Generator;
pub use vector_store::VectorStore;

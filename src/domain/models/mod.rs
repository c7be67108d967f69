mod chunk;
mod content_type;
mod document;
mod entity;
mod file_event;
mod scan_report;
mod search_result;

pub use chunk::{chunk_id, DocumentChunk};
pub use content_type::{classify, language_for, ContentType, SizeLimits};
pub use document::ExtractedDocument;
pub use entity::{entity_id, Entity, EntityKind};
pub use file_event::{EventKind, FileEvent};
pub use scan_report::{ScanError, ScanReport};
pub use search_result::{sort_results, Relevance, SearchQuery, SearchResult};

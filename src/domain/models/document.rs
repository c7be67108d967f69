use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ContentType;

/// The canonical textual representation of one file, produced by an
/// extractor and consumed by the chunker. Transient: never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    file_path: String,
    content_type: ContentType,
    body: String,
    metadata: BTreeMap<String, Value>,
    file_size: u64,
    processing_ms: u64,
    extracted_at: String,
}

impl ExtractedDocument {
    pub fn new(
        file_path: impl Into<String>,
        content_type: ContentType,
        body: impl Into<String>,
        metadata: BTreeMap<String, Value>,
        file_size: u64,
        processing_ms: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content_type,
            body: body.into(),
            metadata,
            file_size,
            processing_ms,
            extracted_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn processing_ms(&self) -> u64 {
        self.processing_ms
    }

    pub fn extracted_at(&self) -> &str {
        &self.extracted_at
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

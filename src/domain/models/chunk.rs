use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The smallest addressable unit in the index: a contiguous text span with a
/// content-addressed id and (once embedded) a fixed-dimension vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    id: String,
    source: String,
    chunk_index: usize,
    total_chunks: usize,
    chunk_size: usize,
    content: String,
    metadata: BTreeMap<String, Value>,
    embedding: Option<Vec<f32>>,
    created_at: String,
}

impl DocumentChunk {
    pub fn new(
        source: impl Into<String>,
        chunk_index: usize,
        total_chunks: usize,
        content: impl Into<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        let source = source.into();
        let content = content.into();
        Self {
            id: chunk_id(&source, chunk_index, &content),
            source,
            chunk_index,
            total_chunks,
            chunk_size: content.chars().count(),
            content,
            metadata,
            embedding: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuilds a chunk from persisted fields without re-deriving the id.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        source: String,
        chunk_index: usize,
        total_chunks: usize,
        content: String,
        metadata: BTreeMap<String, Value>,
        embedding: Option<Vec<f32>>,
        created_at: String,
    ) -> Self {
        let chunk_size = content.chars().count();
        Self {
            id,
            source,
            chunk_index,
            total_chunks,
            chunk_size,
            content,
            metadata,
            embedding,
            created_at,
        }
    }

    pub fn with_embedding(mut self, vector: Vec<f32>) -> Self {
        self.embedding = Some(vector);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.embedding.as_ref().map(|v| v.len())
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn location(&self) -> String {
        format!("{}#{}", self.source, self.chunk_index)
    }
}

/// Deterministic chunk id: `doc_<first 12 hex of md5(source:index:content)>`.
/// A pure function of its inputs, so re-ingesting unchanged content yields
/// the same id and upserts instead of duplicating.
pub fn chunk_id(source: &str, chunk_index: usize, content: &str) -> String {
    let digest = md5::compute(format!("{}:{}:{}", source, chunk_index, content));
    let hex = format!("{:x}", digest);
    format!("doc_{}", &hex[..12])
}

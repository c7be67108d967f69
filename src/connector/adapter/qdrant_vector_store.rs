use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::application::VectorStore;
use crate::domain::{DocumentChunk, DomainError, SearchResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Hosted vector index backend over the Qdrant REST API. Points are upserted
/// with the chunk content and source embedded in the payload; the similarity
/// score comes back directly from the server.
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimension: usize,
}

impl QdrantVectorStore {
    pub async fn new(
        base_url: &str,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DomainError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let store = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            dimension,
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    async fn ensure_collection(&self) -> Result<(), DomainError> {
        let exists = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?
            .status()
            .is_success();
        if exists {
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": self.dimension, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(DomainError::storage(format!(
                "Failed to create collection {}: {}",
                self.collection,
                response.status()
            )));
        }
        debug!("Created collection {} (dimension {})", self.collection, self.dimension);
        Ok(())
    }

    /// Qdrant point ids must be UUIDs or integers, so the content-addressed
    /// chunk id is folded into a deterministic UUID; the original id rides
    /// along in the payload.
    fn point_id(chunk_id: &str) -> String {
        let hex = format!("{:x}", md5::compute(chunk_id));
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }

    fn chunk_to_payload(chunk: &DocumentChunk) -> Value {
        json!({
            "chunk_id": chunk.id(),
            "content": chunk.content(),
            "source": chunk.source(),
            "chunk_index": chunk.chunk_index(),
            "total_chunks": chunk.total_chunks(),
            "metadata": chunk.metadata(),
            "created_at": chunk.created_at(),
        })
    }

    fn payload_to_chunk(payload: &Map<String, Value>) -> DocumentChunk {
        let metadata: BTreeMap<String, Value> = payload
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        DocumentChunk::reconstitute(
            payload
                .get("chunk_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            payload
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            payload
                .get("chunk_index")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            payload
                .get("total_chunks")
                .and_then(Value::as_u64)
                .unwrap_or(1) as usize,
            payload
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            metadata,
            None,
            payload
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    }

    fn source_filter(source: &str) -> Value {
        json!({
            "must": [{ "key": "source", "match": { "value": source } }]
        })
    }

    async fn count_by_filter(&self, filter: Option<Value>) -> Result<u64, DomainError> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(DomainError::storage(format!(
                "Count failed: {}",
                response.status()
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| DomainError::storage(format!("Invalid count response: {}", e)))?;
        Ok(value["result"]["count"].as_u64().unwrap_or(0))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<(), DomainError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = chunk.embedding().ok_or_else(|| {
                DomainError::invalid_input(format!("Chunk {} has no embedding", chunk.id()))
            })?;
            if embedding.len() != self.dimension {
                return Err(DomainError::dimension_mismatch(format!(
                    "Collection dimension is {}, got {}",
                    self.dimension,
                    embedding.len()
                )));
            }
            points.push(json!({
                "id": Self::point_id(chunk.id()),
                "vector": embedding,
                "payload": Self::chunk_to_payload(chunk),
            }));
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(DomainError::storage(format!(
                "Upsert failed: {}",
                response.status()
            )));
        }
        debug!("Upserted {} points into {}", chunks.len(), self.collection);
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if query_embedding.len() != self.dimension {
            return Err(DomainError::invalid_input(format!(
                "Query dimension {} does not match collection dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let body = json!({
            "vector": query_embedding,
            "limit": top_k,
            "with_payload": true,
        });
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(DomainError::storage(format!(
                "Search failed: {}",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| DomainError::storage(format!("Invalid search response: {}", e)))?;
        let hits = value["result"].as_array().cloned().unwrap_or_default();

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let score = hit["score"].as_f64().unwrap_or(0.0) as f32;
            let payload = match hit["payload"].as_object() {
                Some(p) => p.clone(),
                None => {
                    warn!("Search hit without payload, skipping");
                    continue;
                }
            };
            results.push(SearchResult::new(Self::payload_to_chunk(&payload), score));
        }
        Ok(results)
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64, DomainError> {
        let matching = self
            .count_by_filter(Some(Self::source_filter(source)))
            .await?;

        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "filter": Self::source_filter(source) }))
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(DomainError::storage(format!(
                "Delete by source failed: {}",
                response.status()
            )));
        }
        debug!("Deleted {} points for source {}", matching, source);
        Ok(matching)
    }

    async fn test_connection(&self) -> bool {
        self.client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        self.count_by_filter(None).await
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let response = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .map_err(|e| DomainError::backend_unavailable(format!("Vector index unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(DomainError::storage(format!(
                "Failed to drop collection: {}",
                response.status()
            )));
        }
        self.ensure_collection().await
    }

    fn kind(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic_uuid() {
        let a = QdrantVectorStore::point_id("doc_abc123def456");
        let b = QdrantVectorStore::point_id("doc_abc123def456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
        assert_ne!(a, QdrantVectorStore::point_id("doc_other"));
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::{Embedder, EntityStore, VectorStore};
use crate::connector::QueryCache;
use crate::domain::{sort_results, DomainError, SearchQuery, SearchResult};

/// Cached semantic search over the chunk collection.
///
/// Cache hits bypass embedding entirely; misses embed the query, run the
/// backend search, post-filter, band and cache the final list. An embedder
/// outage degrades to an empty result set with a warning rather than an
/// error, so the surface stays usable while the provider restarts.
pub struct SearchService {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    entity_store: Option<Arc<dyn EntityStore>>,
    cache: QueryCache,
}

/// Snapshot of the index surfaced by the stats command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreStats {
    pub collection_size: u64,
    pub entity_count: Option<u64>,
    pub backend: String,
    pub backend_reachable: bool,
    pub embedder: String,
    pub dimension: usize,
    pub cache_state: String,
}

impl SearchService {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cache: QueryCache,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            entity_store: None,
            cache,
        }
    }

    pub fn with_entity_store(mut self, entity_store: Arc<dyn EntityStore>) -> Self {
        self.entity_store = Some(entity_store);
        self
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, DomainError> {
        if query.query().trim().is_empty() {
            return Err(DomainError::invalid_input("Query must not be empty"));
        }

        let cache_key = self.cache.query_key(query);
        if query.use_cache() {
            if let Some(results) = self.cache.get::<Vec<SearchResult>>(&cache_key).await {
                debug!("Search served from cache: {}", query.query());
                return Ok(results);
            }
        }

        let embedding = match self.embedder.embed(query.query()).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Query embedding failed, returning no results: {}", e);
                return Ok(Vec::new());
            }
        };

        // Post-filtering discards rows, so oversample when filters apply.
        let fetch_k = if query.has_filters() {
            query.top_k() * 3
        } else {
            query.top_k()
        };

        let mut results = self.vector_store.search(&embedding, fetch_k).await?;

        if query.has_filters() {
            results.retain(|result| {
                let chunk = result.chunk();
                let type_ok = query.type_filter().is_none_or(|wanted| {
                    chunk
                        .metadata()
                        .get("content_type")
                        .and_then(|v| v.as_str())
                        .is_some_and(|ct| ct == wanted)
                });
                let source_ok = query
                    .source_filter()
                    .is_none_or(|wanted| chunk.source() == wanted);
                type_ok && source_ok
            });
        }

        sort_results(&mut results);
        results.truncate(query.top_k());

        if query.use_cache() && !results.is_empty() {
            self.cache.set_query_result(&cache_key, &results).await;
        }

        debug!("Search '{}' returned {} results", query.query(), results.len());
        Ok(results)
    }

    pub async fn stats(&self) -> Result<CoreStats, DomainError> {
        let collection_size = self.vector_store.count().await?;
        let entity_count = match &self.entity_store {
            Some(store) => Some(store.count().await?),
            None => None,
        };
        Ok(CoreStats {
            collection_size,
            entity_count,
            backend: self.vector_store.kind().to_string(),
            backend_reachable: self.vector_store.test_connection().await,
            embedder: self.embedder.name().to_string(),
            dimension: self.embedder.dimension(),
            cache_state: self.cache.state().await.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ExtractionService;
    use crate::connector::{FileExtractor, MockEmbedder, SqliteVectorStore};
    use crate::domain::{Chunker, DocumentChunk};
    use serde_json::json;
    use std::collections::BTreeMap;

    async fn seeded_service() -> (SearchService, Arc<SqliteVectorStore>) {
        let store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let embedder = Arc::new(MockEmbedder::with_dimension(64));

        let mut chunks = Vec::new();
        for (source, content_type, text) in [
            ("/m/ch1.md", "text", "the tide covered the stone pier"),
            ("/m/ch2.md", "text", "a letter arrived from the island"),
            ("/src/tool.py", "code", "def render(): return canvas"),
        ]
        .iter()
        {
            let mut metadata = BTreeMap::new();
            metadata.insert("chunk_index".to_string(), json!(0));
            metadata.insert("total_chunks".to_string(), json!(1));
            metadata.insert("content_type".to_string(), json!(content_type));
            let chunk = DocumentChunk::new(*source, 0, 1, *text, metadata);
            let vector = embedder.embed(chunk.content()).await.unwrap();
            chunks.push(chunk.with_embedding(vector));
        }
        store.add(&chunks).await.unwrap();

        let service = SearchService::new(store.clone(), embedder, QueryCache::disabled());
        (service, store)
    }

    #[tokio::test]
    async fn test_search_returns_banded_sorted_results() {
        let (service, _store) = seeded_service().await;
        let results = service
            .search(&SearchQuery::new("tide on the pier").with_top_k(3))
            .await
            .unwrap();
        assert!(!results.is_empty());
        for window in results.windows(2) {
            assert!(window[0].score() >= window[1].score());
        }
        for result in &results {
            assert!(result.score() >= 0.0 && result.score() <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let (service, _store) = seeded_service().await;
        let result = service.search(&SearchQuery::new("   ")).await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_type_filter_excludes_other_types() {
        let (service, _store) = seeded_service().await;
        let results = service
            .search(
                &SearchQuery::new("render canvas")
                    .with_top_k(5)
                    .with_type_filter("code"),
            )
            .await
            .unwrap();
        for result in &results {
            assert_eq!(result.chunk().source(), "/src/tool.py");
        }
    }

    #[tokio::test]
    async fn test_source_filter_restricts_results() {
        let (service, _store) = seeded_service().await;
        let results = service
            .search(
                &SearchQuery::new("letter")
                    .with_top_k(5)
                    .with_source_filter("/m/ch2.md"),
            )
            .await
            .unwrap();
        for result in &results {
            assert_eq!(result.chunk().source(), "/m/ch2.md");
        }
    }

    #[tokio::test]
    async fn test_stats_reports_backend_and_counts() {
        let (service, store) = seeded_service().await;
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.collection_size, store.count().await.unwrap());
        assert_eq!(stats.backend, "sqlite");
        assert_eq!(stats.dimension, 64);
        assert_eq!(stats.cache_state, "disabled");
        assert!(stats.backend_reachable);
        assert!(stats.entity_count.is_none());
    }

    #[tokio::test]
    async fn test_search_end_to_end_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scene.txt");
        std::fs::write(&path, "the lighthouse keeper watched the storm roll in.").unwrap();

        let store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let embedder = Arc::new(MockEmbedder::with_dimension(64));
        let extractor = FileExtractor::default();

        let document = extractor.extract(&path).await.unwrap();
        let chunker = Chunker::new(200, 40);
        let pieces = chunker.chunk(document.body());
        let mut chunks = Vec::new();
        for (index, piece) in pieces.into_iter().enumerate() {
            let mut metadata = document.metadata().clone();
            metadata.insert("chunk_index".to_string(), json!(index));
            metadata.insert("total_chunks".to_string(), json!(1));
            let chunk = DocumentChunk::new(document.file_path(), index, 1, piece, metadata);
            let vector = embedder.embed(chunk.content()).await.unwrap();
            chunks.push(chunk.with_embedding(vector));
        }
        store.add(&chunks).await.unwrap();

        let service = SearchService::new(store, embedder, QueryCache::disabled());
        let results = service
            .search(&SearchQuery::new("lighthouse keeper storm"))
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results[0].chunk().content().contains("lighthouse"));
    }
}

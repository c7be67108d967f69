use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{DomainError, SearchQuery};

const QUERY_TTL_SECS: u64 = 1800;
const META_TTL_SECS: u64 = 3600;

/// Redis-backed query and per-source metadata cache.
///
/// Cache loss is never fatal: when redis is unreachable every operation
/// degrades to a no-op with a warning and the core runs uncached.
///
/// Query keys carry a collection generation counter that write paths bump,
/// so every ingest or delete coarsely invalidates prior search entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<QueryCacheInner>,
}

struct QueryCacheInner {
    connection: RwLock<Option<ConnectionManager>>,
    enabled: bool,
    generation: AtomicU64,
}

impl QueryCache {
    /// Fails with `CacheUnavailable` when redis cannot be reached; callers
    /// decide whether to degrade to `disabled()` or surface the error.
    pub async fn connect(host: &str, port: u16, db: u32) -> Result<Self, DomainError> {
        let url = format!("redis://{}:{}/{}", host, port, db);
        let client = redis::Client::open(url.as_str())
            .map_err(|e| DomainError::cache_unavailable(format!("Invalid cache URL {}: {}", url, e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::cache_unavailable(format!("Redis unreachable at {}: {}", url, e)))?;
        info!("Query cache connected to redis at {}:{}/{}", host, port, db);

        Ok(Self {
            inner: Arc::new(QueryCacheInner {
                connection: RwLock::new(Some(connection)),
                enabled: true,
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// A cache that never hits; used in tests and with `--no-cache`.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(QueryCacheInner {
                connection: RwLock::new(None),
                enabled: false,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.enabled && self.inner.connection.read().await.is_some()
    }

    pub async fn state(&self) -> &'static str {
        if self.is_connected().await {
            "connected"
        } else {
            "disabled"
        }
    }

    /// Bumped by every ingest and delete; stale search keys stop matching.
    pub fn bump_generation(&self) {
        self.inner.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Relaxed)
    }

    /// Key includes top_k and filters so differing requests never collide.
    pub fn query_key(&self, query: &SearchQuery) -> String {
        let normalized = query.query().trim().to_lowercase();
        let digest = md5::compute(format!(
            "{}|{}|{}|{}|{}",
            normalized,
            query.top_k(),
            query.type_filter().unwrap_or(""),
            query.source_filter().unwrap_or(""),
            self.generation(),
        ));
        format!("search:{:x}", digest)
    }

    pub fn meta_key(source: &str) -> String {
        format!("doc_meta:{}", source)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut guard = self.inner.connection.write().await;
        let conn = guard.as_mut()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => {
                    debug!("cache hit: {}", key);
                    Some(value)
                }
                Err(e) => {
                    warn!("Cache deserialization error for {}: {}", key, e);
                    None
                }
            },
            Ok(None) => {
                debug!("cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Cache read error, degrading: {}", e);
                None
            }
        }
    }

    pub async fn set_query_result<T: Serialize>(&self, key: &str, value: &T) -> bool {
        self.set_with_ttl(key, value, QUERY_TTL_SECS).await
    }

    pub async fn set_doc_meta<T: Serialize>(&self, source: &str, value: &T) -> bool {
        self.set_with_ttl(&Self::meta_key(source), value, META_TTL_SECS)
            .await
    }

    async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: u64) -> bool {
        let mut guard = self.inner.connection.write().await;
        let conn = match guard.as_mut() {
            Some(c) => c,
            None => return false,
        };
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("Cache serialization error for {}: {}", key, e);
                return false;
            }
        };
        match conn.set_ex::<_, _, ()>(key, serialized, ttl).await {
            Ok(_) => {
                debug!("cache set: {} (ttl {}s)", key, ttl);
                true
            }
            Err(e) => {
                warn!("Cache write error, degrading: {}", e);
                false
            }
        }
    }

    pub async fn invalidate_doc_meta(&self, source: &str) -> bool {
        let mut guard = self.inner.connection.write().await;
        let conn = match guard.as_mut() {
            Some(c) => c,
            None => return false,
        };
        match conn.del::<_, ()>(Self::meta_key(source)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Cache delete error, degrading: {}", e);
                false
            }
        }
    }

    /// Drops every `search:*` entry. The generation counter already fences
    /// stale hits; this reclaims memory eagerly.
    pub async fn flush_queries(&self) -> bool {
        let mut guard = self.inner.connection.write().await;
        let conn = match guard.as_mut() {
            Some(c) => c,
            None => return false,
        };
        match redis::cmd("KEYS")
            .arg("search:*")
            .query_async::<Vec<String>>(conn)
            .await
        {
            Ok(keys) if !keys.is_empty() => match conn.del::<_, ()>(&keys[..]).await {
                Ok(_) => {
                    info!("Flushed {} cached queries", keys.len());
                    true
                }
                Err(e) => {
                    warn!("Cache flush error: {}", e);
                    false
                }
            },
            Ok(_) => true,
            Err(e) => {
                warn!("Cache flush error: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_key_includes_top_k_and_filters() {
        let cache = QueryCache::disabled();
        let base = cache.query_key(&SearchQuery::new("hello world"));
        assert!(base.starts_with("search:"));

        assert_eq!(base, cache.query_key(&SearchQuery::new("  HELLO world ")));
        assert_ne!(base, cache.query_key(&SearchQuery::new("hello world").with_top_k(9)));
        assert_ne!(
            base,
            cache.query_key(&SearchQuery::new("hello world").with_type_filter("code"))
        );
        assert_ne!(
            base,
            cache.query_key(&SearchQuery::new("hello world").with_source_filter("/a/f.md"))
        );
    }

    #[test]
    fn test_generation_bump_invalidates_keys() {
        let cache = QueryCache::disabled();
        let query = SearchQuery::new("same query");
        let before = cache.query_key(&query);
        cache.bump_generation();
        assert_ne!(before, cache.query_key(&query));
    }

    #[test]
    fn test_meta_key_format() {
        assert_eq!(QueryCache::meta_key("/a/f.txt"), "doc_meta:/a/f.txt");
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = QueryCache::disabled();
        assert!(!cache.is_connected().await);
        assert_eq!(cache.state().await, "disabled");
        let value: Option<String> = cache.get("search:abc").await;
        assert!(value.is_none());
        assert!(!cache.set_query_result("search:abc", &"x").await);
    }
}

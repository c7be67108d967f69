use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::application::use_cases::IngestCoordinator;
use crate::application::{EntityExtraction, EntityStore};
use crate::connector::QueryCache;
use crate::domain::{DomainError, EventKind, FileEvent};

const BACKEND_RETRIES: u32 = 3;
const BACKEND_BACKOFF: Duration = Duration::from_secs(1);

/// Extensions the live indexer reacts to; everything else is ignored noise.
const INDEXED_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "md", "txt", "json", "yaml", "yml", "rs", "toml",
];

const EXCLUDED_COMPONENTS: &[&str] = &[
    "__pycache__",
    ".git",
    "node_modules",
    ".venv",
    "dist",
    "build",
    "target",
];

/// Counters accumulated over one watch session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerStats {
    pub created: u64,
    pub modified: u64,
    pub deleted: u64,
    pub errors: u64,
}

/// Consumes debounced file events and keeps the vector collection and the
/// entity manifest in step with the tree. Each event is handled on its own
/// task, bounded by a semaphore so a burst of saves cannot flood the
/// embedder. Events for the same path serialize on a per-path lock:
/// delete-then-add is not atomic, so two interleaved handlers could leave
/// the index holding an older version of the file than the disk does.
pub struct ManifestIndexer {
    coordinator: Arc<IngestCoordinator>,
    entity_store: Arc<dyn EntityStore>,
    entity_extractor: Arc<dyn EntityExtraction>,
    cache: QueryCache,
    project_root: PathBuf,
    stats_path: Option<PathBuf>,
    concurrency: usize,
    stats: Arc<Mutex<IndexerStats>>,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ManifestIndexer {
    pub fn new(
        coordinator: Arc<IngestCoordinator>,
        entity_store: Arc<dyn EntityStore>,
        entity_extractor: Arc<dyn EntityExtraction>,
        cache: QueryCache,
        project_root: PathBuf,
        concurrency: usize,
    ) -> Self {
        Self {
            coordinator,
            entity_store,
            entity_extractor,
            cache,
            project_root,
            stats_path: None,
            concurrency: concurrency.max(1),
            stats: Arc::new(Mutex::new(IndexerStats::default())),
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Where to write the session summary on shutdown.
    pub fn with_stats_path(mut self, path: PathBuf) -> Self {
        self.stats_path = Some(path);
        self
    }

    pub async fn stats(&self) -> IndexerStats {
        self.stats.lock().await.clone()
    }

    /// Whether a path belongs in the manifest at all.
    pub fn should_index(path: &Path) -> bool {
        let extension_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| INDEXED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if !extension_ok {
            return false;
        }
        !path.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            EXCLUDED_COMPONENTS.contains(&name.as_ref())
                || (name.starts_with('.') && name.len() > 1 && name != "..")
        })
    }

    /// Runs until the event channel closes, then writes the session summary.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<FileEvent>) {
        info!(
            "Manifest indexer watching {} ({} workers)",
            self.project_root.display(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handlers = JoinSet::new();

        while let Some(event) = events.recv().await {
            if !Self::should_index(&event.path) {
                debug!("Ignoring event for {}", event.path.display());
                continue;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let indexer = Arc::clone(&self);
            handlers.spawn(async move {
                let _permit = permit;
                indexer.handle_event(event).await;
            });

            // Reap finished handlers so the set does not grow unbounded.
            while handlers.try_join_next().is_some() {}
        }

        while handlers.join_next().await.is_some() {}
        self.write_summary().await;
        info!("Manifest indexer stopped");
    }

    async fn handle_event(&self, event: FileEvent) {
        let lock = self.path_lock(&event.path).await;
        let guard = lock.lock().await;

        let outcome = match event.kind {
            EventKind::Created | EventKind::Modified => self.reindex(&event.path).await,
            EventKind::Deleted => self.remove(&event.path).await,
        };

        drop(guard);
        drop(lock);
        self.drop_idle_path_lock(&event.path).await;

        let mut stats = self.stats.lock().await;
        match outcome {
            Ok(()) => match event.kind {
                EventKind::Created => stats.created += 1,
                EventKind::Modified => stats.modified += 1,
                EventKind::Deleted => stats.deleted += 1,
            },
            Err(e) => {
                stats.errors += 1;
                warn!("Event for {} failed: {}", event.path.display(), e);
            }
        }
    }

    async fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().await;
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Forgets the lock once no handler holds it, so the map tracks only
    /// paths with in-flight work.
    async fn drop_idle_path_lock(&self, path: &Path) {
        let mut locks = self.path_locks.lock().await;
        if locks.get(path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(path);
        }
    }

    async fn reindex(&self, path: &Path) -> Result<(), DomainError> {
        if !path.is_file() {
            // A rapid save-then-delete can race the debouncer.
            debug!("Skipping vanished path {}", path.display());
            return Ok(());
        }

        with_backend_retry(|| async {
            let stats = self.coordinator.ingest_file(path).await?;
            debug!(
                "Reindexed {} ({} chunks, {} bytes)",
                path.display(),
                stats.chunks(),
                stats.bytes()
            );
            Ok(())
        })
        .await?;

        if self.entity_extractor.supports(path) {
            let content = tokio::fs::read_to_string(path).await?;
            let entities = self.entity_extractor.extract_entities(path, &content).await?;
            let source = path.to_string_lossy();
            with_backend_retry(|| async {
                self.entity_store.delete_by_source(&source).await?;
                self.entity_store.upsert_batch(&entities).await
            })
            .await?;
            debug!("Refreshed {} entities for {}", entities.len(), source);
        }
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), DomainError> {
        let source = path.to_string_lossy();
        with_backend_retry(|| async {
            self.entity_store.delete_by_source(&source).await.map(|_| ())
        })
        .await?;
        self.coordinator.delete_source(&source).await?;
        self.cache.invalidate_doc_meta(&source).await;
        Ok(())
    }

    async fn write_summary(&self) {
        let Some(stats_path) = &self.stats_path else {
            return;
        };
        let stats = self.stats.lock().await.clone();
        let summary = json!({
            "stats": stats,
            "end_time": chrono::Utc::now().to_rfc3339(),
            "project_root": self.project_root.display().to_string(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(body) => {
                if let Err(e) = tokio::fs::write(stats_path, body).await {
                    error!("Failed to write {}: {}", stats_path.display(), e);
                }
            }
            Err(e) => error!("Failed to encode session summary: {}", e),
        }
    }
}

/// Retries transient backend outages with exponential backoff; every other
/// error propagates immediately.
async fn with_backend_retry<F, Fut>(mut operation: F) -> Result<(), DomainError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), DomainError>>,
{
    let mut backoff = BACKEND_BACKOFF;
    let mut last_error = None;
    for attempt in 1..=BACKEND_RETRIES {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_backend_unavailable() => {
                warn!("Backend attempt {}/{} failed: {}", attempt, BACKEND_RETRIES, e);
                last_error = Some(e);
                if attempt < BACKEND_RETRIES {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_error.unwrap_or_else(|| DomainError::backend_unavailable("Backend unavailable")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{Embedder, VectorStore};
    use crate::connector::{
        FileExtractor, MockEmbedder, SqliteEntityStore, SqliteVectorStore,
        StructuralEntityExtractor,
    };
    use crate::domain::Chunker;
    use tempfile::TempDir;

    fn indexer(
        dir: &TempDir,
        vector_store: Arc<SqliteVectorStore>,
        entity_store: Arc<SqliteEntityStore>,
    ) -> Arc<ManifestIndexer> {
        let coordinator = Arc::new(IngestCoordinator::new(
            vector_store,
            Arc::new(MockEmbedder::with_dimension(32)),
            Arc::new(FileExtractor::default()),
            QueryCache::disabled(),
            Chunker::new(200, 40),
            2,
        ));
        Arc::new(ManifestIndexer::new(
            coordinator,
            entity_store,
            Arc::new(StructuralEntityExtractor::new()),
            QueryCache::disabled(),
            dir.path().to_path_buf(),
            2,
        ))
    }

    #[test]
    fn test_should_index_whitelist() {
        assert!(ManifestIndexer::should_index(Path::new("/p/notes.md")));
        assert!(ManifestIndexer::should_index(Path::new("/p/src/lib.rs")));
        assert!(!ManifestIndexer::should_index(Path::new("/p/photo.png")));
        assert!(!ManifestIndexer::should_index(Path::new("/p/Makefile")));
        assert!(!ManifestIndexer::should_index(Path::new(
            "/p/node_modules/pkg/index.js"
        )));
        assert!(!ManifestIndexer::should_index(Path::new(
            "/p/.venv/lib/tool.py"
        )));
    }

    #[tokio::test]
    async fn test_created_event_indexes_chunks_and_entities() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tool.py");
        std::fs::write(&path, "class Indexer:\n    def run(self):\n        pass\n").unwrap();

        let vector_store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let entity_store = Arc::new(SqliteEntityStore::in_memory().unwrap());
        let indexer = indexer(&dir, vector_store.clone(), entity_store.clone());

        let (tx, rx) = mpsc::channel(8);
        tx.send(FileEvent::created(path.clone())).await.unwrap();
        drop(tx);
        Arc::clone(&indexer).run(rx).await;

        assert!(vector_store.count().await.unwrap() > 0);
        assert!(entity_store.count().await.unwrap() > 0);
        let stats = indexer.stats().await;
        assert_eq!(stats.created, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_deleted_event_removes_both_sides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Heading\n\nsome text body\n").unwrap();

        let vector_store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let entity_store = Arc::new(SqliteEntityStore::in_memory().unwrap());
        let indexer = indexer(&dir, vector_store.clone(), entity_store.clone());

        let (tx, rx) = mpsc::channel(8);
        tx.send(FileEvent::created(path.clone())).await.unwrap();
        drop(tx);
        Arc::clone(&indexer).run(rx).await;
        assert!(vector_store.count().await.unwrap() > 0);

        std::fs::remove_file(&path).unwrap();
        let (tx, rx) = mpsc::channel(8);
        tx.send(FileEvent::deleted(path.clone())).await.unwrap();
        drop(tx);
        Arc::clone(&indexer).run(rx).await;

        assert_eq!(vector_store.count().await.unwrap(), 0);
        assert_eq!(entity_store.count().await.unwrap(), 0);
        let stats = indexer.stats().await;
        assert_eq!(stats.deleted, 1);
    }

    /// Embedder that stalls whenever the text carries a marker, letting a
    /// test hold one file version mid-pipeline while a newer one arrives.
    struct StallOnMarker {
        inner: MockEmbedder,
        marker: &'static str,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Embedder for StallOnMarker {
        async fn ready(&self) -> bool {
            true
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
            if text.contains(self.marker) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "stalling-mock"
        }
    }

    #[tokio::test]
    async fn test_rapid_saves_to_one_path_keep_latest_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("draft.txt");
        std::fs::write(&path, "version one of the draft.").unwrap();

        let vector_store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let entity_store = Arc::new(SqliteEntityStore::in_memory().unwrap());
        let embedder = Arc::new(StallOnMarker {
            inner: MockEmbedder::with_dimension(32),
            marker: "version one",
            delay: Duration::from_millis(250),
        });
        let coordinator = Arc::new(IngestCoordinator::new(
            vector_store.clone(),
            embedder.clone(),
            Arc::new(FileExtractor::default()),
            QueryCache::disabled(),
            Chunker::new(200, 40),
            2,
        ));
        let indexer = Arc::new(ManifestIndexer::new(
            coordinator,
            entity_store,
            Arc::new(StructuralEntityExtractor::new()),
            QueryCache::disabled(),
            dir.path().to_path_buf(),
            2,
        ));

        let (tx, rx) = mpsc::channel(8);
        let runner = tokio::spawn(Arc::clone(&indexer).run(rx));

        // First save: the handler reads version one and stalls in embedding.
        tx.send(FileEvent::modified(path.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Second save lands while the first is still in flight. Without
        // per-path serialization the second handler would finish first and
        // the stalled one would then overwrite the index with version one.
        std::fs::write(&path, "version two of the draft.").unwrap();
        tx.send(FileEvent::modified(path.clone())).await.unwrap();
        drop(tx);
        runner.await.unwrap();

        assert_eq!(vector_store.count().await.unwrap(), 1);
        let query = embedder.embed("version two of the draft.").await.unwrap();
        let results = vector_store.search(&query, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk().content().contains("version two"));

        let stats = indexer.stats().await;
        assert_eq!(stats.modified, 2);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_summary_written_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let stats_path = dir.path().join("session.json");
        let vector_store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let entity_store = Arc::new(SqliteEntityStore::in_memory().unwrap());

        let coordinator = Arc::new(IngestCoordinator::new(
            vector_store,
            Arc::new(MockEmbedder::with_dimension(32)),
            Arc::new(FileExtractor::default()),
            QueryCache::disabled(),
            Chunker::new(200, 40),
            2,
        ));
        let indexer = Arc::new(
            ManifestIndexer::new(
                coordinator,
                entity_store,
                Arc::new(StructuralEntityExtractor::new()),
                QueryCache::disabled(),
                dir.path().to_path_buf(),
                2,
            )
            .with_stats_path(stats_path.clone()),
        );

        let (tx, rx) = mpsc::channel::<FileEvent>(1);
        drop(tx);
        indexer.run(rx).await;

        let body = std::fs::read_to_string(&stats_path).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(summary.get("stats").is_some());
        assert!(summary.get("end_time").is_some());
        assert_eq!(
            summary.get("project_root").and_then(|v| v.as_str()),
            Some(dir.path().display().to_string().as_str())
        );
    }
}

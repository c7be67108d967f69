use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::application::{Embedder, ExtractionService, VectorStore};
use crate::connector::QueryCache;
use crate::domain::{
    classify, clean_text, Chunker, ContentType, DocumentChunk, DomainError, ScanReport,
};

const EMBED_RETRIES: u32 = 3;
const EMBED_BACKOFF: Duration = Duration::from_millis(500);
const STORE_TIMEOUT: Duration = Duration::from_secs(60);

/// Directory names never descended into during a scan.
const EXCLUDED_COMPONENTS: &[&str] = &[
    "__pycache__",
    ".git",
    "node_modules",
    ".venv",
    "dist",
    "build",
    "target",
];

/// Per-file ingestion outcome folded into the scan report.
pub struct FileStats {
    bytes: u64,
    chunks: u64,
    content_type: ContentType,
    extension: String,
}

/// Bulk ingestion: walks a tree, extracts and chunks each file, embeds the
/// chunks and upserts them, deleting the file's prior chunks first so
/// re-ingesting shrinks rather than accumulates.
pub struct IngestCoordinator {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn ExtractionService>,
    cache: QueryCache,
    chunker: Chunker,
    max_workers: usize,
    cancelled: Arc<AtomicBool>,
}

impl IngestCoordinator {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn ExtractionService>,
        cache: QueryCache,
        chunker: Chunker,
        max_workers: usize,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            extractor,
            cache,
            chunker,
            max_workers: max_workers.max(1),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cooperative cancellation of a running scan.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Walks `root` and ingests every indexable file. Soft failures are
    /// recorded per file and the scan continues; a `BackendUnavailable`
    /// aborts with a partial report.
    pub async fn scan(
        &self,
        root: &Path,
        include: &[String],
        exclude: &[String],
    ) -> Result<ScanReport, DomainError> {
        let started = Instant::now();
        let root = root
            .canonicalize()
            .map_err(|e| DomainError::invalid_input(format!("Invalid path: {}", e)))?;

        let include_set = build_globset(include)?;
        let exclude_set = build_globset(exclude)?;

        let files = collect_files(&root, include_set.as_ref(), exclude_set.as_ref());
        let total = files.len() as u64;
        info!("Found {} files to ingest under {}", total, root.display());

        let mut report = ScanReport::default();
        if files.is_empty() {
            report.finish(started.elapsed().as_secs_f64());
            return Ok(report);
        }

        let progress_bar = ProgressBar::new(total);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );

        // Batches keep failure fallout bounded; within a batch files embed
        // and store concurrently up to max_workers in flight.
        let batch_size = (files.len() / self.max_workers).max(1);

        'batches: for batch in files.chunks(batch_size) {
            let outcomes: Vec<(PathBuf, Result<FileStats, DomainError>)> = stream::iter(batch)
                .map(|path| {
                    let path = path.clone();
                    let progress_bar = progress_bar.clone();
                    async move {
                        progress_bar.set_message(path.display().to_string());
                        let outcome = if self.is_cancelled() {
                            Err(DomainError::cancelled("Scan cancelled"))
                        } else {
                            self.ingest_file(&path).await
                        };
                        progress_bar.inc(1);
                        (path, outcome)
                    }
                })
                .buffer_unordered(self.max_workers)
                .collect()
                .await;

            let mut batch_report = ScanReport::default();
            for (path, outcome) in outcomes {
                match outcome {
                    Ok(stats) => {
                        batch_report.track_largest(&path.to_string_lossy(), stats.bytes);
                        batch_report.record_document(
                            stats.content_type.as_str(),
                            &stats.extension,
                            stats.bytes,
                            stats.chunks,
                        );
                    }
                    Err(e) if e.is_backend_unavailable() || e.is_dimension_mismatch() => {
                        warn!("Aborting scan: {}", e);
                        batch_report.record_error(path.to_string_lossy(), e.kind(), e.to_string());
                        batch_report.aborted = true;
                        break;
                    }
                    Err(e) if e.is_cancelled() => {
                        batch_report.aborted = true;
                        break;
                    }
                    Err(e) => {
                        if e.is_soft() {
                            debug!("Skipping {}: {}", path.display(), e);
                        } else {
                            warn!("Skipping {}: {}", path.display(), e);
                        }
                        batch_report.record_error(path.to_string_lossy(), e.kind(), e.to_string());
                    }
                }
            }

            let aborted = batch_report.aborted;
            report.merge(batch_report);
            if aborted {
                break 'batches;
            }
        }

        progress_bar.finish_with_message("done");
        report.finish(started.elapsed().as_secs_f64());
        info!(
            "Scan complete: {} documents, {} chunks, {} skipped in {:.2}s{}",
            report.documents,
            report.chunks,
            report.skipped,
            report.duration_secs,
            if report.aborted { " (aborted)" } else { "" }
        );
        Ok(report)
    }

    /// Extract, chunk, embed and store one file. Prior chunks for the same
    /// source are deleted only after every new chunk embedded successfully,
    /// so extraction and embedding failures leave the old state intact. A
    /// store failure in the window after the delete can still lose the
    /// previous version.
    pub async fn ingest_file(&self, path: &Path) -> Result<FileStats, DomainError> {
        let document = self.extractor.extract(path).await?;
        let source = document.file_path().to_string();
        let body = clean_text(document.body());
        let pieces = self.chunker.chunk(&body);
        if pieces.is_empty() {
            return Err(DomainError::extraction(format!(
                "No chunks produced from {}",
                source
            )));
        }

        let total_chunks = pieces.len();
        let mut chunks = Vec::with_capacity(total_chunks);
        for (chunk_index, piece) in pieces.into_iter().enumerate() {
            let mut metadata = document.metadata().clone();
            // Stores reconstitute positional fields from these keys.
            metadata.insert("chunk_index".to_string(), json!(chunk_index));
            metadata.insert("total_chunks".to_string(), json!(total_chunks));
            metadata.insert("source".to_string(), json!(source));

            let chunk = DocumentChunk::new(&source, chunk_index, total_chunks, piece, metadata);
            let embedding = self.embed_with_retry(chunk.content()).await?;
            chunks.push(chunk.with_embedding(embedding));
        }

        self.vector_store.delete_by_source(&source).await?;
        match tokio::time::timeout(STORE_TIMEOUT, self.vector_store.add(&chunks)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DomainError::backend_unavailable(format!(
                    "Vector store write timed out after {}s for {}",
                    STORE_TIMEOUT.as_secs(),
                    source
                )))
            }
        }

        self.cache
            .set_doc_meta(&source, &doc_meta(document.metadata(), total_chunks))
            .await;
        self.cache.bump_generation();

        debug!("Ingested {} ({} chunks)", source, total_chunks);
        Ok(FileStats {
            bytes: document.file_size(),
            chunks: total_chunks as u64,
            content_type: document.content_type(),
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase(),
        })
    }

    /// Ingests raw text under a caller-chosen source name, bypassing the
    /// filesystem. Returns the number of chunks stored.
    pub async fn add_document(
        &self,
        text: &str,
        metadata: BTreeMap<String, Value>,
        source: &str,
    ) -> Result<u64, DomainError> {
        let body = clean_text(text);
        let pieces = self.chunker.chunk(&body);
        if pieces.is_empty() {
            return Err(DomainError::invalid_input("Document has no content"));
        }

        let total_chunks = pieces.len();
        let mut chunks = Vec::with_capacity(total_chunks);
        for (chunk_index, piece) in pieces.into_iter().enumerate() {
            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert("chunk_index".to_string(), json!(chunk_index));
            chunk_metadata.insert("total_chunks".to_string(), json!(total_chunks));
            chunk_metadata.insert("source".to_string(), json!(source));

            let chunk = DocumentChunk::new(source, chunk_index, total_chunks, piece, chunk_metadata);
            let embedding = self.embed_with_retry(chunk.content()).await?;
            chunks.push(chunk.with_embedding(embedding));
        }

        self.vector_store.delete_by_source(source).await?;
        self.vector_store.add(&chunks).await?;
        self.cache.set_doc_meta(source, &doc_meta(&metadata, total_chunks)).await;
        self.cache.bump_generation();
        Ok(total_chunks as u64)
    }

    /// Removes every chunk for `source`, invalidates its cached metadata and
    /// flushes cached query results that may still carry the deleted chunks.
    pub async fn delete_source(&self, source: &str) -> Result<u64, DomainError> {
        let removed = self.vector_store.delete_by_source(source).await?;
        self.cache.invalidate_doc_meta(source).await;
        self.cache.flush_queries().await;
        self.cache.bump_generation();
        info!("Deleted {} chunks for {}", removed, source);
        Ok(removed)
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let mut backoff = EMBED_BACKOFF;
        let mut last_error = None;
        for attempt in 1..=EMBED_RETRIES {
            match self.embedder.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_dimension_mismatch() => return Err(e),
                Err(e) => {
                    warn!("Embedding attempt {}/{} failed: {}", attempt, EMBED_RETRIES, e);
                    last_error = Some(e);
                    if attempt < EMBED_RETRIES {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| DomainError::embedding("Embedding failed")))
    }
}

impl FileStats {
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

fn doc_meta(metadata: &BTreeMap<String, Value>, total_chunks: usize) -> Value {
    json!({
        "metadata": metadata,
        "total_chunks": total_chunks,
        "ingested_at": chrono::Utc::now().to_rfc3339(),
    })
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, DomainError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| DomainError::invalid_input(format!("Bad glob {}: {}", pattern, e)))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| DomainError::invalid_input(format!("Bad glob set: {}", e)))?;
    Ok(Some(set))
}

fn collect_files(
    root: &Path,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !EXCLUDED_COMPONENTS.contains(&name.as_ref())
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error walking directory: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || classify(path).is_none() {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if let Some(include) = include {
            if !include.is_match(relative) {
                continue;
            }
        }
        if let Some(exclude) = exclude {
            if exclude.is_match(relative) {
                continue;
            }
        }

        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if seen.insert(canonical.clone()) {
            files.push(canonical);
        }
    }
    files
}

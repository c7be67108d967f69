use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use scriptorium::{
    AnswerQuery, Chunker, CoreConfig, DuckDbVectorStore, Embedder, EntityStore, FileExtractor,
    FileWatcher, IngestCoordinator, ManifestIndexer, MockEmbedder, OllamaEmbedder,
    OllamaGenerator, QdrantVectorStore, QueryCache, SearchQuery, SearchService, SqliteEntityStore,
    SqliteVectorStore, StructuralEntityExtractor, VectorStore,
};

#[derive(Parser)]
#[command(name = "scriptorium")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, default_value = "~/.scriptorium")]
    data_dir: String,

    #[arg(long, global = true)]
    mock_embeddings: bool,

    #[arg(long, global = true)]
    no_cache: bool,

    /// Vector backend: duckdb, qdrant or sqlite. Overrides the config file.
    #[arg(long, global = true)]
    store: Option<String>,

    #[arg(long, global = true)]
    qdrant_url: Option<String>,

    #[arg(long, global = true)]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory and index every supported file.
    Scan {
        path: PathBuf,

        /// Glob patterns to include (relative to the scan root).
        #[arg(short, long)]
        include: Vec<String>,

        /// Glob patterns to exclude.
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// Semantic search over the indexed collection.
    Search {
        query: String,

        #[arg(long, default_value = "5")]
        num: usize,

        /// Restrict to one content type (text, code, document, data, config).
        #[arg(short = 't', long)]
        r#type: Option<String>,

        /// Restrict to one source path.
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Answer a question from indexed material via the generator.
    Ask {
        question: String,

        #[arg(long, default_value = "5")]
        num: usize,
    },

    /// Watch a directory and keep the index live.
    Watch {
        path: PathBuf,

        /// Where to write the session summary on shutdown.
        #[arg(long)]
        stats_file: Option<PathBuf>,
    },

    /// Index raw text under a chosen source name.
    Add {
        text: String,

        #[arg(short, long)]
        source: String,
    },

    /// Remove every chunk and entity for a source.
    Delete { source: String },

    /// Show collection, backend and cache status.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(store) = &cli.store {
        config.vector_db = store.clone();
    }
    if let Some(url) = &cli.qdrant_url {
        config.vector_db_config.endpoint = url.clone();
    }
    if let Some(url) = &cli.ollama_url {
        config.ollama_url = url.clone();
    }

    let data_dir = PathBuf::from(expand_tilde(&cli.data_dir));
    std::fs::create_dir_all(&data_dir)?;

    let embedder: Arc<dyn Embedder> = if cli.mock_embeddings || config.embedding_provider == "mock"
    {
        info!("Using mock embedder");
        Arc::new(MockEmbedder::new())
    } else {
        let ollama = OllamaEmbedder::new(
            &config.ollama_url,
            &config.embedding_model,
            config.embedding_dimension,
        )?;
        if !ollama.ready().await {
            warn!(
                "Ollama at {} is not responding; embedding calls will retry",
                config.ollama_url
            );
        }
        Arc::new(ollama)
    };

    let cache = if cli.no_cache || !config.cache.enabled {
        QueryCache::disabled()
    } else {
        match QueryCache::connect(&config.cache.host, config.cache.port, config.cache.db).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!("{}, running uncached", e);
                QueryCache::disabled()
            }
        }
    };

    let vector_store = open_vector_store(&config, &data_dir, embedder.dimension()).await?;
    let chunker = Chunker::new(config.chunk_size, config.chunk_overlap);

    match cli.command {
        Commands::Scan {
            path,
            include,
            exclude,
        } => {
            let coordinator = IngestCoordinator::new(
                vector_store,
                embedder,
                Arc::new(FileExtractor::new(config.size_limits.clone())),
                cache,
                chunker,
                config.max_workers,
            );
            let report = coordinator.scan(&path, &include, &exclude).await?;

            println!(
                "Indexed {} documents ({} chunks, {} skipped) in {:.2}s",
                report.documents, report.chunks, report.skipped, report.duration_secs
            );
            if report.aborted {
                println!("Scan aborted early; the report above is partial.");
            }
            for (content_type, count) in &report.by_type {
                println!("  {}: {}", content_type, count);
            }
            if !report.errors.is_empty() {
                println!("Skipped files:");
                for error in report.errors.iter().take(20) {
                    println!("  {} [{}] {}", error.path, error.kind, error.message);
                }
                if report.errors.len() > 20 {
                    println!("  ... and {} more", report.errors.len() - 20);
                }
            }
        }

        Commands::Search {
            query,
            num,
            r#type,
            source,
        } => {
            let service = SearchService::new(vector_store, embedder, cache);
            let mut search_query = SearchQuery::new(&query)
                .with_top_k(num)
                .with_cache(!cli.no_cache);
            if let Some(content_type) = r#type {
                search_query = search_query.with_type_filter(content_type);
            }
            if let Some(source) = source {
                search_query = search_query.with_source_filter(source);
            }

            let results = service.search(&search_query).await?;
            if results.is_empty() {
                println!("No results found.");
            } else {
                println!("Found {} results:\n", results.len());
                for (i, result) in results.iter().enumerate() {
                    println!("{}. {}", i + 1, result.display_line());
                    let preview: String = result
                        .chunk()
                        .content()
                        .lines()
                        .take(6)
                        .map(|l| format!("   | {}", l))
                        .collect::<Vec<_>>()
                        .join("\n");
                    println!("{}\n", preview);
                }
            }
        }

        Commands::Ask { question, num } => {
            let generator = Arc::new(OllamaGenerator::new(
                &config.ollama_url,
                &config.generation_model,
            )?);
            let service = Arc::new(SearchService::new(vector_store, embedder, cache));
            let use_case = AnswerQuery::new(service, generator);

            let response = use_case
                .execute(&SearchQuery::new(&question).with_top_k(num))
                .await?;
            println!("{}\n", response.answer);
            println!("Confidence: {:.2}", response.confidence);
            if !response.sources.is_empty() {
                println!("Sources:");
                for source in &response.sources {
                    println!("  {}", source);
                }
            }
        }

        Commands::Watch { path, stats_file } => {
            let entity_store = Arc::new(SqliteEntityStore::new(&data_dir.join("manifest.db"))?);
            let coordinator = Arc::new(IngestCoordinator::new(
                vector_store,
                embedder,
                Arc::new(FileExtractor::new(config.size_limits.clone())),
                cache.clone(),
                chunker,
                config.max_workers,
            ));

            let mut indexer = ManifestIndexer::new(
                coordinator,
                entity_store,
                Arc::new(StructuralEntityExtractor::new()),
                cache,
                path.clone(),
                config.max_workers,
            );
            if let Some(stats_file) = stats_file {
                indexer = indexer.with_stats_path(stats_file);
            }
            let indexer = Arc::new(indexer);

            let (tx, rx) = mpsc::channel(256);
            let mut watcher = FileWatcher::new(tx, Duration::from_millis(500))?;
            watcher.watch(&path)?;

            let runner = tokio::spawn(Arc::clone(&indexer).run(rx));
            println!("Watching {} (ctrl-c to stop)", path.display());
            tokio::signal::ctrl_c().await?;

            // Dropping the watcher closes the event channel and lets the
            // indexer drain in-flight work before exiting.
            drop(watcher);
            runner.await?;

            let stats = indexer.stats().await;
            println!(
                "Session: {} created, {} modified, {} deleted, {} errors",
                stats.created, stats.modified, stats.deleted, stats.errors
            );
        }

        Commands::Add { text, source } => {
            let coordinator = IngestCoordinator::new(
                vector_store,
                embedder,
                Arc::new(FileExtractor::new(config.size_limits.clone())),
                cache,
                chunker,
                config.max_workers,
            );
            let chunks = coordinator
                .add_document(&text, BTreeMap::new(), &source)
                .await?;
            println!("Indexed {} chunks under {}", chunks, source);
        }

        Commands::Delete { source } => {
            let coordinator = IngestCoordinator::new(
                vector_store,
                embedder,
                Arc::new(FileExtractor::new(config.size_limits.clone())),
                cache,
                chunker,
                config.max_workers,
            );
            let removed = coordinator.delete_source(&source).await?;
            let manifest_path = data_dir.join("manifest.db");
            if manifest_path.exists() {
                let entity_store = SqliteEntityStore::new(&manifest_path)?;
                entity_store.delete_by_source(&source).await?;
            }
            println!("Deleted {} chunks for {}", removed, source);
        }

        Commands::Stats => {
            let mut service = SearchService::new(vector_store, embedder, cache);
            let manifest_path = data_dir.join("manifest.db");
            if manifest_path.exists() {
                service =
                    service.with_entity_store(Arc::new(SqliteEntityStore::new(&manifest_path)?));
            }
            let stats = service.stats().await?;

            println!("Scriptorium Statistics");
            println!("======================");
            println!("Backend:    {} (reachable: {})", stats.backend, stats.backend_reachable);
            println!("Chunks:     {}", stats.collection_size);
            if let Some(entities) = stats.entity_count {
                println!("Entities:   {}", entities);
            }
            println!("Embedder:   {} (dim {})", stats.embedder, stats.dimension);
            println!("Cache:      {}", stats.cache_state);
            println!("Data dir:   {}", data_dir.display());
        }
    }

    Ok(())
}

async fn open_vector_store(
    config: &CoreConfig,
    data_dir: &std::path::Path,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_db.as_str() {
        "qdrant" => {
            let endpoint = &config.vector_db_config.endpoint;
            match QdrantVectorStore::new(endpoint, &config.vector_db_config.collection, dimension)
                .await
            {
                Ok(qdrant) => {
                    info!("Connected to Qdrant at {}", endpoint);
                    Arc::new(qdrant)
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to Qdrant ({}): {}. Falling back to SQLite.",
                        endpoint, e
                    );
                    Arc::new(SqliteVectorStore::new(&data_dir.join("scriptorium.db"))?)
                }
            }
        }
        "sqlite" => {
            let path = data_dir.join("scriptorium.db");
            info!("Using SQLite vector storage at {}", path.display());
            Arc::new(SqliteVectorStore::new(&path)?)
        }
        _ => {
            let path = data_dir.join("scriptorium.duckdb");
            match DuckDbVectorStore::new(&path, dimension) {
                Ok(duckdb) => {
                    info!("Using DuckDB vector storage at {}", path.display());
                    Arc::new(duckdb)
                }
                Err(e) => {
                    warn!(
                        "Failed to initialize DuckDB ({}): {}. Falling back to SQLite.",
                        path.display(),
                        e
                    );
                    Arc::new(SqliteVectorStore::new(&data_dir.join("scriptorium.db"))?)
                }
            }
        }
    };
    Ok(store)
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            if path == "~" {
                return home.to_string_lossy().to_string();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Confirm;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::RagContext;
use crate::config::{Config, EmbeddingProvider, run_interactive_config, show_config};
use crate::database::sqlite::Database;
use crate::embeddings::OllamaEmbedder;
use crate::embeddings::fastembed::resolve_model;
use crate::indexer::{IngestOptions, IngestReport};
use crate::search::{SearchResponse, filter_by_similarity};

const SNIPPET_CHARS: usize = 160;

/// Arguments of the `search` command
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub collections: Vec<String>,
    pub min_similarity: Option<f32>,
    pub json: bool,
}

async fn open_context(config: Config) -> Result<RagContext> {
    RagContext::open(config)
        .await
        .context("Failed to open retrieval context")
}

/// Embed the query, search the collections and print ranked results to stdout
#[inline]
pub async fn search(config: Config, request: SearchRequest) -> Result<()> {
    let context = open_context(config).await?;
    let top_k = request.limit.unwrap_or(context.config().search.top_k);

    let mut response = if request.collections.is_empty() {
        context.search(&request.query, Some(top_k)).await?
    } else {
        context
            .searcher()
            .search_collections(&request.query, top_k, &request.collections)
            .await?
    };

    if let Some(threshold) = request.min_similarity {
        response.results = filter_by_similarity(response.results, threshold);
    }

    for skipped in &response.skipped {
        eprintln!(
            "{} {}",
            style("Skipped collection:").yellow(),
            skipped.reason
        );
    }

    if request.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialize results")?
        );
    } else {
        print!("{}", render_results(&response));
    }

    context.close().await;
    Ok(())
}

/// Plain-text rendering of a search response, one block per result
#[inline]
pub fn render_results(response: &SearchResponse) -> String {
    if response.results.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (rank, result) in response.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {:.4}  {}  {}#{}\n    {}",
            rank + 1,
            result.distance,
            result.collection,
            result.metadata.source_path,
            result.metadata.chunk_index,
            snippet(&result.text, SNIPPET_CHARS)
        );
    }
    out
}

/// First `max_chars` characters of `text` on one line
#[inline]
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flattened.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", flattened.get(..cut).unwrap_or_default()),
        None => flattened,
    }
}

/// Parse a `key=value` tag argument
#[inline]
pub fn parse_tag(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("tag key is empty in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Index files and directories into one collection.
///
/// Fails when documents were found but none of them could be ingested, which
/// covers the single-document case.
#[inline]
pub async fn ingest(
    config: Config,
    paths: &[PathBuf],
    collection: &str,
    force: bool,
    tags: Vec<(String, String)>,
) -> Result<()> {
    let context = open_context(config).await?;
    let options = IngestOptions {
        force,
        tags: tags.into_iter().collect::<BTreeMap<_, _>>(),
        show_progress: true,
    };

    let report = context
        .indexer()
        .ingest_paths(paths, collection, &options)
        .await?;
    context.close().await;

    print_ingest_report(&report, collection);
    check_ingest_report(&report)
}

fn print_ingest_report(report: &IngestReport, collection: &str) {
    for (path, chunks) in &report.indexed {
        println!(
            "{} {} ({} chunks)",
            style("indexed").green(),
            path.display(),
            chunks
        );
    }
    for path in &report.unchanged {
        println!("{} {}", style("unchanged").dim(), path.display());
    }
    for failure in &report.failed {
        println!(
            "{} {}: {}",
            style("failed").red(),
            failure.path.display(),
            failure.error
        );
    }

    println!(
        "{} documents into '{}': {} indexed ({} chunks), {} unchanged, {} failed",
        report.documents_seen(),
        collection,
        report.indexed.len(),
        report.chunks_written(),
        report.unchanged.len(),
        report.failed.len()
    );
}

/// Exit policy for an ingestion run
#[inline]
pub fn check_ingest_report(report: &IngestReport) -> Result<()> {
    if report.documents_seen() == 0 {
        bail!("No documents found to ingest");
    }
    if report.indexed.is_empty() && report.unchanged.is_empty() {
        bail!("All {} documents failed to ingest", report.failed.len());
    }
    Ok(())
}

/// Show configured and stored collections with their record counts
#[inline]
pub async fn list_collections(config: Config) -> Result<()> {
    let context = open_context(config).await?;
    let store = context.vector_store();

    let stored = store.list_collections().await?;
    let tracked = match context.database() {
        Some(database) => database.document_counts().await.unwrap_or_else(|e| {
            warn!("Failed to read document counts: {:#}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    let configured = &context.config().storage.collection_names;
    let mut names = configured.clone();
    names.extend(stored.into_iter().filter(|s| !configured.contains(s)));

    println!("Collections ({} total):", names.len());
    for name in &names {
        let records = match store.collection(name).await {
            Ok(Some(collection)) => collection.count().await?.to_string(),
            Ok(None) => "0".to_string(),
            Err(e) => format!("unreadable ({})", e),
        };
        let documents = tracked
            .iter()
            .find(|c| &c.collection == name)
            .map_or(0, |c| c.documents);
        let marker = if context.config().is_configured_collection(name) {
            style("configured").green()
        } else {
            style("unconfigured").yellow()
        };

        println!(
            "  {} [{}] {} records, {} documents",
            style(name).bold(),
            marker,
            records,
            documents
        );
    }

    context.close().await;
    Ok(())
}

/// Drop a collection and its side-table rows after confirmation
#[inline]
pub async fn reset(config: Config, collection: &str, yes: bool) -> Result<()> {
    if !yes {
        if !console::user_attended() {
            bail!("Refusing to reset '{}' without --yes", collection);
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete every record in '{}'? This cannot be undone",
                collection
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    let context = open_context(config).await?;
    let existed = context.reset_collection(collection).await?;
    context.close().await;

    if existed {
        info!("Reset collection {}", collection);
        println!("Collection '{}' dropped.", collection);
    } else {
        println!("Collection '{}' had no stored records.", collection);
    }
    Ok(())
}

/// Report configuration, side table, vector store and embedder health
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    println!("{}", style("hub-rag status").bold().cyan());
    println!("  Config: {}", config.config_file_path().display());

    match config.validate() {
        Ok(()) => println!("  {} configuration valid", style("ok").green()),
        Err(e) => println!("  {} configuration invalid: {}", style("error").red(), e),
    }

    match Database::new(config.database_path()).await {
        Ok(database) => {
            match database.document_counts().await {
                Ok(counts) => {
                    let documents: i64 = counts.iter().map(|c| c.documents).sum();
                    println!(
                        "  {} side table: {} documents tracked",
                        style("ok").green(),
                        documents
                    );
                }
                Err(e) => println!("  {} side table unreadable: {:#}", style("error").red(), e),
            }
            database.close().await;
        }
        Err(e) => println!("  {} side table unavailable: {:#}", style("error").red(), e),
    }

    match lancedb::connect(&config.vector_database_path().to_string_lossy())
        .execute()
        .await
    {
        Ok(connection) => match connection.table_names().execute().await {
            Ok(tables) => println!(
                "  {} vector store: {} collections stored",
                style("ok").green(),
                tables.len()
            ),
            Err(e) => println!("  {} vector store unreadable: {}", style("error").red(), e),
        },
        Err(e) => println!("  {} vector store unavailable: {}", style("error").red(), e),
    }

    print_embedder_status(&config);
    Ok(())
}

fn print_embedder_status(config: &Config) {
    match config.embedding.provider {
        EmbeddingProvider::FastEmbed => match resolve_model(&config.embedding.model_name) {
            Ok((_, dimension)) => {
                let cached = model_cache_present(&config.model_cache_path());
                println!(
                    "  {} embedder: fastembed {} ({} dimensions, {})",
                    style("ok").green(),
                    config.embedding.model_name,
                    dimension,
                    if cached { "cached" } else { "downloads on first use" }
                );
            }
            Err(e) => println!("  {} embedder: {}", style("error").red(), e),
        },
        EmbeddingProvider::Ollama => {
            match OllamaEmbedder::new(&config.embedding).map(|client| client.health_check()) {
                Ok(Ok(())) => println!(
                    "  {} embedder: ollama {}",
                    style("ok").green(),
                    config.embedding.model_name
                ),
                Ok(Err(e)) => println!("  {} embedder: {:#}", style("error").red(), e),
                Err(e) => println!("  {} embedder: {}", style("error").red(), e),
            }
        }
    }
}

fn model_cache_present(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

/// Print the most recent searches, newest first
#[inline]
pub async fn show_history(config: Config, limit: i64) -> Result<()> {
    let database = Database::new(config.database_path())
        .await
        .context("Failed to open side table")?;
    let entries = database.recent_searches(limit).await?;
    database.close().await;

    if entries.is_empty() {
        println!("No searches recorded yet.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:>3} results (top {})  [{}]  {}",
            style(entry.searched_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            entry.result_count,
            entry.top_k,
            entry.collection_names().join(", "),
            entry.query
        );
    }
    Ok(())
}

/// Display the configuration or run the interactive editor
#[inline]
pub fn configure(config_dir: &Path, show: bool) -> Result<()> {
    if show {
        let config = Config::load(config_dir)?;
        show_config(&config)
    } else {
        run_interactive_config(config_dir)
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use hub_rag::commands::{
    SearchRequest, configure, ingest, list_collections, parse_tag, reset, search, show_history,
    show_status,
};
use hub_rag::config::{Config, get_config_dir};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hub-rag")]
#[command(about = "Chunk, embed and search local text collections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the configured collections
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Maximum number of results, defaults to the configured top_k
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        /// Restrict the search to these collections
        #[arg(long = "collection", short = 'c')]
        collections: Vec<String>,
        /// Drop results whose similarity (1 - distance) is below this value
        #[arg(long)]
        min_similarity: Option<f32>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingest files or directories into a collection
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,
        /// Target collection
        #[arg(long, short = 'c')]
        collection: String,
        /// Reindex documents even if their content is unchanged
        #[arg(long)]
        force: bool,
        /// Tag copied into every chunk's metadata, as key=value
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },
    /// List collections with their record counts
    Collections,
    /// Drop a collection and forget its documents
    Reset {
        collection: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Check configuration, storage and embedding model health
    Status,
    /// Show recent searches
    History {
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: i64,
    },
    /// Configure the embedding model, chunking and collections
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            limit,
            collections,
            min_similarity,
            json,
        } => {
            let request = SearchRequest {
                query: query.join(" "),
                limit,
                collections,
                min_similarity,
                json,
            };
            search(Config::load_default()?, request).await?;
        }
        Commands::Ingest {
            paths,
            collection,
            force,
            tags,
        } => {
            ingest(Config::load_default()?, &paths, &collection, force, tags).await?;
        }
        Commands::Collections => {
            list_collections(Config::load_default()?).await?;
        }
        Commands::Reset { collection, yes } => {
            reset(Config::load_default()?, &collection, yes).await?;
        }
        Commands::Status => {
            show_status(Config::load_default()?).await?;
        }
        Commands::History { limit } => {
            show_history(Config::load_default()?, limit).await?;
        }
        Commands::Config { show } => {
            configure(&get_config_dir()?, show)?;
        }
    }

    Ok(())
}

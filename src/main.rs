//! # Muse Memory CLI (`muse`)
//!
//! Operational interface for the memory engine: schema initialization,
//! resource and voice-memory writes, scoped search, style-sample ingestion,
//! cluster reindexing, and graph-context search.
//!
//! ## Usage
//!
//! ```bash
//! muse --config ./config/muse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `muse init` | Create the SQLite database and schema |
//! | `muse upsert <id> <text>` | Store a resource document |
//! | `muse search "<query>" --author <id>` | Scoped resource search |
//! | `muse get <id>` | Fetch the latest row for a resource id |
//! | `muse voice add\|search` | Per-persona voice memory |
//! | `muse style ingest\|search` | Style reference pool |
//! | `muse clusters reindex\|search` | Style archetype clusters |
//! | `muse graph "<query>"` | Semantic + association-tag search |
//! | `muse stats` | Per-collection document counts |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use muse_memory::config;
use muse_memory::db;
use muse_memory::embedding::EmbeddingGateway;
use muse_memory::engine::MemoryEngine;
use muse_memory::migrate;
use muse_memory::models::{Scope, SearchHit, SearchType};
use muse_memory::resources::ResourceFilters;
use muse_memory::store::sqlite::SqliteStore;

/// Muse Memory — scoped vector memory and retrieval for persona-driven
/// content generation.
#[derive(Parser)]
#[command(
    name = "muse",
    about = "Muse Memory — scoped vector memory and retrieval engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/muse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Store a resource document, chunking long text.
    Upsert {
        id: String,
        text: String,
        /// Metadata as a JSON object (authorId, teamId, sourceType, ...).
        #[arg(long, default_value = "{}")]
        meta: String,
    },

    /// Search resources visible to a scope.
    Search {
        query: String,
        #[arg(long, default_value_t = 8)]
        limit: usize,
        /// Requesting author id.
        #[arg(long)]
        author: String,
        /// Requesting team id.
        #[arg(long)]
        team: Option<String>,
        /// Restrict results to these sourceType values (repeatable).
        #[arg(long = "source-type")]
        source_types: Vec<String>,
    },

    /// Fetch the latest stored row for a resource id.
    Get { id: String },

    /// Per-persona voice memory.
    Voice {
        #[command(subcommand)]
        command: VoiceCommands,
    },

    /// Style reference pool.
    Style {
        #[command(subcommand)]
        command: StyleCommands,
    },

    /// Style archetype clusters.
    Clusters {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Semantic search plus association-tag traversal.
    Graph {
        query: String,
        #[arg(long, default_value_t = 8)]
        limit: usize,
    },

    /// Per-collection document counts.
    Stats,
}

#[derive(Subcommand)]
enum VoiceCommands {
    /// Remember a persona output.
    Add {
        persona: String,
        id: String,
        text: String,
        #[arg(long, default_value = "{}")]
        meta: String,
    },
    /// Search a persona's voice memory.
    Search {
        persona: String,
        query: String,
        #[arg(long, default_value_t = 8)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum StyleCommands {
    /// Ingest style samples, one argument per sample.
    Ingest { texts: Vec<String> },
    /// Search the style reference pool.
    Search {
        query: String,
        #[arg(long, default_value_t = 8)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Recompute style clusters from the reference pool.
    Reindex,
    /// Search style archetypes.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;
        pool.close().await;
        println!("initialized {}", config.db.path.display());
        println!("ok");
        return Ok(());
    }

    let pool = db::connect(&config.db.path).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let gateway = EmbeddingGateway::from_config(&config.embedding)?;
    let engine = MemoryEngine::new(
        store,
        gateway,
        config.memory.clone(),
        config.chunking.clone(),
    );

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Upsert { id, text, meta } => {
            let metadata = parse_meta(&meta)?;
            engine.upsert_resource(&id, &text, metadata).await?;
            println!("upsert {}", id);
            println!("ok");
        }
        Commands::Search {
            query,
            limit,
            author,
            team,
            source_types,
        } => {
            let scope = Scope::new(author, team);
            let filters = if source_types.is_empty() {
                None
            } else {
                Some(ResourceFilters { source_types })
            };
            let hits = engine
                .search_resources(&query, limit, &scope, filters.as_ref())
                .await?;
            println!("search \"{}\"", query);
            print_hits(&hits);
            println!("ok");
        }
        Commands::Get { id } => match engine.get_resource(&id).await? {
            Some(doc) => {
                println!("get {}", doc.id);
                println!("  created_at: {}", doc.created_at);
                println!("  metadata: {}", doc.metadata);
                println!("  text: {}", doc.text);
                println!("ok");
            }
            None => println!("not found: {}", id),
        },
        Commands::Voice { command } => match command {
            VoiceCommands::Add {
                persona,
                id,
                text,
                meta,
            } => {
                let metadata = parse_meta(&meta)?;
                engine
                    .upsert_to_voice_memory(&persona, &id, &text, metadata)
                    .await?;
                println!("voice add {} ({})", id, persona);
                println!("ok");
            }
            VoiceCommands::Search {
                persona,
                query,
                limit,
            } => {
                let hits = engine.search_voice_memory(&persona, &query, limit).await?;
                println!("voice search \"{}\" ({})", query, persona);
                print_hits(&hits);
                println!("ok");
            }
        },
        Commands::Style { command } => match command {
            StyleCommands::Ingest { texts } => {
                engine.ingest_style_samples(&texts).await?;
                println!("style ingest");
                println!("  samples submitted: {}", texts.len());
                println!("ok");
            }
            StyleCommands::Search { query, limit } => {
                let hits = engine.search_style_memory(&query, limit).await?;
                println!("style search \"{}\"", query);
                print_hits(&hits);
                println!("ok");
            }
        },
        Commands::Clusters { command } => match command {
            ClusterCommands::Reindex => {
                engine.reindex_style_clusters().await?;
                println!("clusters reindex");
                println!("ok");
            }
            ClusterCommands::Search { query, limit } => {
                let clusters = engine.search_style_clusters(&query, limit).await?;
                println!("clusters search \"{}\"", query);
                for cluster in &clusters {
                    println!("  {} ({} samples)", cluster.label, cluster.count);
                }
                println!("ok");
            }
        },
        Commands::Graph { query, limit } => {
            let hits = engine.search_graph_context(&query, limit).await?;
            println!("graph \"{}\"", query);
            for hit in &hits {
                let kind = match hit.search_type {
                    SearchType::Semantic => "semantic",
                    SearchType::LogicalLeap => "logical-leap",
                };
                println!(
                    "  {:<12} {:>6.3}  {}  {}",
                    kind,
                    hit.score,
                    hit.document.id,
                    excerpt(&hit.document.text)
                );
            }
            println!("ok");
        }
        Commands::Stats => {
            println!("collections");
            for (name, count) in engine.stats().await? {
                println!("  {}: {}", name, count);
            }
            println!("ok");
        }
    }

    Ok(())
}

fn parse_meta(meta: &str) -> Result<serde_json::Value> {
    serde_json::from_str(meta).context("--meta must be a valid JSON object")
}

fn print_hits(hits: &[SearchHit]) {
    for hit in hits {
        println!(
            "  {:>6.3}  {}  {}",
            hit.score,
            hit.document.id,
            excerpt(&hit.document.text)
        );
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(72).collect::<String>().replace('\n', " ")
}

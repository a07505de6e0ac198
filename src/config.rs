use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Chunking applied to resource text before embedding. Sizes are in bytes
/// (approximate characters for ASCII-dominant content).
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_overlap() -> usize {
    200
}
fn default_max_chunks() -> usize {
    8
}

/// Collection naming and retrieval tunables, fixed at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_resources_collection")]
    pub resources_collection: String,
    #[serde(default = "default_voice_prefix")]
    pub voice_collection_prefix: String,
    #[serde(default = "default_style_references_collection")]
    pub style_references_collection: String,
    #[serde(default = "default_style_clusters_collection")]
    pub style_clusters_collection: String,
    /// Below this many style references, a reindex is a silent no-op.
    #[serde(default = "default_min_cluster_samples")]
    pub min_cluster_samples: usize,
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
    /// Cap on association-reached results in graph context search.
    #[serde(default = "default_leap_limit")]
    pub leap_limit: usize,
    /// Scoped searches fetch `limit × candidate_factor` rows before the
    /// visibility post-filter.
    #[serde(default = "default_candidate_factor")]
    pub candidate_factor: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            resources_collection: default_resources_collection(),
            voice_collection_prefix: default_voice_prefix(),
            style_references_collection: default_style_references_collection(),
            style_clusters_collection: default_style_clusters_collection(),
            min_cluster_samples: default_min_cluster_samples(),
            max_clusters: default_max_clusters(),
            leap_limit: default_leap_limit(),
            candidate_factor: default_candidate_factor(),
        }
    }
}

fn default_resources_collection() -> String {
    "resources".to_string()
}
fn default_voice_prefix() -> String {
    "voice_memory_".to_string()
}
fn default_style_references_collection() -> String {
    "style_references".to_string()
}
fn default_style_clusters_collection() -> String {
    "style_clusters".to_string()
}
fn default_min_cluster_samples() -> usize {
    5
}
fn default_max_clusters() -> usize {
    8
}
fn default_leap_limit() -> usize {
    3
}
fn default_candidate_factor() -> usize {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.max_chunks == 0 {
        anyhow::bail!("chunking.max_chunks must be > 0");
    }
    if config.memory.candidate_factor == 0 {
        anyhow::bail!("memory.candidate_factor must be >= 1");
    }
    if config.memory.min_cluster_samples < 2 {
        anyhow::bail!("memory.min_cluster_samples must be >= 2");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

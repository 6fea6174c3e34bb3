//! TOML configuration.
//!
//! Every section and field has a default, so a missing config file yields a
//! working [`Config`] rooted at `./data`. [`load_config`] parses and validates
//! a file; [`load_config_or_default`] is what the CLI uses.
//!
//! ```toml
//! [paths]
//! source_files = ["data/ingestion_storage/dsm5.docx"]
//! index_dir = "data/index_storage"
//!
//! [chunking]
//! chunk_size = 512
//! chunk_overlap = 20
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Locations of every persisted file.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Explicit list of source documents to ingest.
    #[serde(default = "default_source_files")]
    pub source_files: Vec<PathBuf>,
    /// Optional directory scanned in addition to `source_files`.
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    #[serde(default = "default_conversation_file")]
    pub conversation_file: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_scores_file")]
    pub scores_file: PathBuf,
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_files: default_source_files(),
            source_dir: None,
            include_globs: default_include_globs(),
            cache_file: default_cache_file(),
            conversation_file: default_conversation_file(),
            index_dir: default_index_dir(),
            scores_file: default_scores_file(),
            users_file: default_users_file(),
        }
    }
}

impl PathsConfig {
    /// Location of the SQLite index snapshot inside `index_dir`.
    pub fn index_db(&self) -> PathBuf {
        self.index_dir.join("index.sqlite")
    }

    /// Rebase every path under `root`. Used by tests and `setup --root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            source_files: vec![root.join("ingestion_storage/dsm5.docx")],
            source_dir: None,
            include_globs: default_include_globs(),
            cache_file: root.join("cache/pipeline_cache.json"),
            conversation_file: root.join("cache/chat_history.json"),
            index_dir: root.join("index_storage"),
            scores_file: root.join("user_storage/scores.json"),
            users_file: root.join("user_storage/users.yaml"),
        }
    }
}

fn default_source_files() -> Vec<PathBuf> {
    vec![PathBuf::from("data/ingestion_storage/dsm5.docx")]
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.docx".to_string(),
        "**/*.pdf".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}
fn default_cache_file() -> PathBuf {
    PathBuf::from("data/cache/pipeline_cache.json")
}
fn default_conversation_file() -> PathBuf {
    PathBuf::from("data/cache/chat_history.json")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("data/index_storage")
}
fn default_scores_file() -> PathBuf {
    PathBuf::from("data/user_storage/scores.json")
}
fn default_users_file() -> PathBuf {
    PathBuf::from("data/user_storage/users.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: default_similarity_top_k(),
        }
    }
}

fn default_similarity_top_k() -> usize {
    3
}

/// Chat-completion model settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            api_base: default_api_base(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Endpoint override (Ollama URL or OpenAI-compatible base).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("text-embedding-3-small".to_string())
}
fn default_embedding_dims() -> Option<usize> {
    Some(1536)
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_memory_token_limit")]
    pub memory_token_limit: usize,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            memory_token_limit: default_memory_token_limit(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_memory_token_limit() -> usize {
    3000
}
fn default_max_tool_rounds() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

impl Config {
    /// Default configuration with every file stored under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            paths: PathsConfig::rooted_at(root),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }
        if self.retrieval.similarity_top_k < 1 {
            anyhow::bail!("retrieval.similarity_top_k must be >= 1");
        }
        if self.agent.memory_token_limit == 0 {
            anyhow::bail!("agent.memory_token_limit must be > 0");
        }
        if self.agent.max_tool_rounds < 1 {
            anyhow::bail!("agent.max_tool_rounds must be >= 1");
        }

        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                anyhow::bail!("embedding.batch_size must be > 0");
            }
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to the built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 512);
        assert_eq!(cfg.chunking.chunk_overlap, 20);
        assert_eq!(cfg.retrieval.similarity_top_k, 3);
        assert_eq!(cfg.agent.memory_token_limit, 3000);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(
            cfg.paths.index_db(),
            PathBuf::from("data/index_storage/index.sqlite")
        );
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse_config("[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn disabled_embedding_skips_dims_check() {
        let cfg = parse_config("[embedding]\nprovider = \"disabled\"\ndims = 0\n").unwrap();
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn rooted_paths() {
        let cfg = Config::rooted_at(Path::new("/tmp/x"));
        assert_eq!(
            cfg.paths.scores_file,
            PathBuf::from("/tmp/x/user_storage/scores.json")
        );
        assert_eq!(
            cfg.paths.index_db(),
            PathBuf::from("/tmp/x/index_storage/index.sqlite")
        );
    }
}

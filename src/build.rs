//! `mindcare build`: ingest the corpus and build or load the vector index.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::chunk::TokenCounter;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{self, IndexOrigin};
use crate::ingest::{self, IngestReport};
use crate::llm::{self, ChatModel};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, Stage};

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub ingest: IngestReport,
    pub origin: IndexOrigin,
    pub index_nodes: usize,
    pub index_path: PathBuf,
}

pub async fn run_build(config: &Config, progress: &dyn BuildProgressReporter) -> Result<BuildReport> {
    let chat = llm::create_chat_model(&config.llm)?;
    let embedder = embedding::create_embedder(&config.embedding)?;
    run_build_with(config, chat, embedder, progress).await
}

pub async fn run_build_with(
    config: &Config,
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport> {
    let counter = TokenCounter::new()?;
    let embed_model = embedder.model_name().to_string();
    let (nodes, ingest_report) = ingest::ingest(config, counter, chat, embedder, progress).await?;

    progress.report(BuildProgressEvent::Started { stage: Stage::Index });
    let index_path = config.paths.index_db();
    let handle = index::build_or_load(&index_path, nodes, &embed_model).await?;
    let index_nodes = handle.index.len();
    progress.report(BuildProgressEvent::Advanced {
        stage: Stage::Index,
        n: index_nodes as u64,
        total: index_nodes as u64,
    });

    Ok(BuildReport {
        ingest: ingest_report,
        origin: handle.origin,
        index_nodes,
        index_path,
    })
}

impl BuildReport {
    /// Plain-text summary printed on stdout.
    pub fn render(&self) -> String {
        let r = &self.ingest;
        format!(
            "build ok\n\
             documents: {}\n\
             nodes: {}\n\
             cache: {}\n\
             summaries: {} cached, {} generated\n\
             embeddings: {} cached, {} generated\n\
             index: {} ({} nodes) at {}\n",
            r.documents,
            r.nodes,
            if r.cache_loaded { "loaded" } else { "fresh" },
            r.summary_hits,
            r.summary_misses,
            r.embedding_hits,
            r.embedding_misses,
            self.origin.as_str(),
            self.index_nodes,
            self.index_path.display()
        )
    }
}

//! Ingestion pipeline: load → split → summarize → embed.
//!
//! Summaries and embeddings are cached in a JSON file keyed by
//! `sha256(stage fingerprint ‖ chunk hash)`. A fingerprint names everything
//! that changes a stage's output (model name, prompt template), so switching
//! models invalidates exactly the stage it affects. Re-running on unchanged
//! sources makes no model calls at all.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunk::{Chunker, TokenCounter};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::llm::{self, ChatModel};
use crate::loader;
use crate::models::{Node, SourceDocument};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, Stage};
use crate::prompts;

const CACHE_VERSION: u32 = 1;

// ============ Cache ============

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IngestionCache {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    summaries: BTreeMap<String, String>,
    #[serde(default)]
    embeddings: BTreeMap<String, Vec<f32>>,
}

impl IngestionCache {
    /// Load the cache file. Absent, corrupt or foreign-version files yield an
    /// empty cache; the second value says whether a usable cache was found.
    pub fn load(path: &Path) -> (Self, bool) {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                info!(path = %path.display(), "no ingestion cache found, running without cache");
                return (Self::empty(), false);
            }
        };
        match serde_json::from_str::<IngestionCache>(&content) {
            Ok(cache) if cache.version == CACHE_VERSION => {
                info!(path = %path.display(), "ingestion cache found, running with cache");
                (cache, true)
            }
            Ok(cache) => {
                warn!(version = cache.version, "ingestion cache version mismatch, ignoring");
                (Self::empty(), false)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ingestion cache unreadable, ignoring");
                (Self::empty(), false)
            }
        }
    }

    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            ..Self::default()
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write ingestion cache: {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.summaries.len() + self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn cache_key(fingerprint: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update([0u8]);
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============ Pipeline ============

/// Counts for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub nodes: usize,
    pub cache_loaded: bool,
    pub summary_hits: usize,
    pub summary_misses: usize,
    pub embedding_hits: usize,
    pub embedding_misses: usize,
}

pub struct IngestionPipeline {
    chunker: Chunker,
    summarizer: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    summary_template: String,
}

impl IngestionPipeline {
    pub fn new(
        config: &Config,
        counter: TokenCounter,
        summarizer: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            chunker: Chunker::new(
                counter,
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            ),
            summarizer,
            embedder,
            batch_size: config.embedding.batch_size.max(1),
            summary_template: prompts::SUMMARY_EXTRACT_TEMPLATE.to_string(),
        }
    }

    fn summary_fingerprint(&self) -> String {
        format!(
            "summary\0{}\0{}",
            self.summarizer.model_name(),
            self.summary_template
        )
    }

    fn embedding_fingerprint(&self) -> String {
        format!(
            "embedding\0{}\0{}",
            self.embedder.model_name(),
            self.embedder.dims()
        )
    }

    /// Run split, summarize and embed over `docs`. New stage outputs are
    /// written into `cache` as they are produced, so a failed run still
    /// keeps the work it finished.
    pub async fn run(
        &self,
        docs: &[SourceDocument],
        cache: &mut IngestionCache,
        progress: &dyn BuildProgressReporter,
    ) -> Result<(Vec<Node>, IngestReport)> {
        let mut report = IngestReport {
            documents: docs.len(),
            ..IngestReport::default()
        };

        progress.report(BuildProgressEvent::Started { stage: Stage::Split });
        let mut nodes: Vec<Node> = docs
            .iter()
            .flat_map(|doc| self.chunker.split(&doc.id, &doc.body))
            .collect();
        report.nodes = nodes.len();
        let total = nodes.len() as u64;
        progress.report(BuildProgressEvent::Advanced {
            stage: Stage::Split,
            n: total,
            total,
        });

        self.summarize(&mut nodes, cache, &mut report, progress)
            .await?;
        self.embed(&mut nodes, cache, &mut report, progress).await?;

        info!(
            documents = report.documents,
            nodes = report.nodes,
            summary_hits = report.summary_hits,
            embedding_hits = report.embedding_hits,
            "ingestion complete"
        );
        Ok((nodes, report))
    }

    async fn summarize(
        &self,
        nodes: &mut [Node],
        cache: &mut IngestionCache,
        report: &mut IngestReport,
        progress: &dyn BuildProgressReporter,
    ) -> Result<()> {
        let fingerprint = self.summary_fingerprint();
        let total = nodes.len() as u64;
        progress.report(BuildProgressEvent::Started {
            stage: Stage::Summarize,
        });

        for (i, node) in nodes.iter_mut().enumerate() {
            let key = cache_key(&fingerprint, &node.hash);
            if let Some(summary) = cache.summaries.get(&key) {
                node.summary = Some(summary.clone());
                report.summary_hits += 1;
            } else {
                let prompt = prompts::render(&self.summary_template, &[("context_str", &node.text)]);
                let summary = llm::complete_prompt(self.summarizer.as_ref(), &prompt)
                    .await
                    .with_context(|| format!("Summarizing node {} of {}", i, node.source_id))?;
                let summary = summary.trim().to_string();
                cache.summaries.insert(key, summary.clone());
                node.summary = Some(summary);
                report.summary_misses += 1;
            }
            progress.report(BuildProgressEvent::Advanced {
                stage: Stage::Summarize,
                n: i as u64 + 1,
                total,
            });
        }
        Ok(())
    }

    async fn embed(
        &self,
        nodes: &mut [Node],
        cache: &mut IngestionCache,
        report: &mut IngestReport,
        progress: &dyn BuildProgressReporter,
    ) -> Result<()> {
        let fingerprint = self.embedding_fingerprint();
        let total = nodes.len() as u64;
        progress.report(BuildProgressEvent::Started { stage: Stage::Embed });

        let mut pending: Vec<usize> = Vec::new();
        for (i, node) in nodes.iter_mut().enumerate() {
            match cache.embeddings.get(&cache_key(&fingerprint, &node.hash)) {
                Some(vector) => {
                    node.embedding = Some(vector.clone());
                    report.embedding_hits += 1;
                }
                None => pending.push(i),
            }
        }

        let mut done = report.embedding_hits as u64;
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| nodes[i].text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .context("Embedding batch failed")?;
            if vectors.len() != batch.len() {
                anyhow::bail!(
                    "Embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
            }
            for (&i, vector) in batch.iter().zip(vectors) {
                cache
                    .embeddings
                    .insert(cache_key(&fingerprint, &nodes[i].hash), vector.clone());
                nodes[i].embedding = Some(vector);
                report.embedding_misses += 1;
            }
            done += batch.len() as u64;
            progress.report(BuildProgressEvent::Advanced {
                stage: Stage::Embed,
                n: done,
                total,
            });
        }
        Ok(())
    }
}

/// Load sources, run the pipeline with the persisted cache and write the
/// cache back, also when a stage failed partway.
pub async fn ingest(
    config: &Config,
    counter: TokenCounter,
    summarizer: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    progress: &dyn BuildProgressReporter,
) -> Result<(Vec<Node>, IngestReport)> {
    progress.report(BuildProgressEvent::Started { stage: Stage::Load });
    let docs = loader::load_documents(&config.paths)?;
    if docs.is_empty() {
        anyhow::bail!("no source documents could be loaded (check paths.source_files)");
    }
    progress.report(BuildProgressEvent::Advanced {
        stage: Stage::Load,
        n: docs.len() as u64,
        total: docs.len() as u64,
    });
    for doc in &docs {
        info!(id = %doc.id, "loaded document");
    }

    let cache_path = &config.paths.cache_file;
    let (mut cache, cache_loaded) = IngestionCache::load(cache_path);

    let pipeline = IngestionPipeline::new(config, counter, summarizer, embedder);
    let result = pipeline.run(&docs, &mut cache, progress).await;

    cache.persist(cache_path)?;
    let (nodes, mut report) = result?;
    report.cache_loaded = cache_loaded;
    Ok((nodes, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, ChatResponse, LlmError, Message};
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for CountingSummarizer {
        fn model_name(&self) -> &str {
            "fake-chat"
        }
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &request.messages[0].content;
            Ok(ChatResponse {
                message: Message::assistant(format!("summary of {} chars", prompt.len())),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "fake-embed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn config_with_source(tmp: &TempDir) -> Config {
        let mut config = Config::rooted_at(tmp.path());
        let source = tmp.path().join("ingestion_storage/notes.txt");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        let body = (0..300)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        std::fs::write(&source, body).unwrap();
        config.paths.source_files = vec![source];
        config.chunking.chunk_size = 64;
        config.chunking.chunk_overlap = 8;
        config.embedding.batch_size = 4;
        config
    }

    #[tokio::test]
    async fn second_run_is_fully_cached() {
        let tmp = TempDir::new().unwrap();
        let config = config_with_source(&tmp);
        let counter = TokenCounter::new().unwrap();
        let chat = Arc::new(CountingSummarizer::default());
        let embed = Arc::new(CountingEmbedder::default());

        let (first, report1) = ingest(&config, counter.clone(), chat.clone(), embed.clone(), &NoProgress)
            .await
            .unwrap();
        assert!(!report1.cache_loaded);
        assert_eq!(report1.summary_misses, first.len());
        assert!(first.iter().all(|n| n.summary.is_some() && n.embedding.is_some()));
        let chat_calls = chat.calls.load(Ordering::SeqCst);
        let embed_calls = embed.calls.load(Ordering::SeqCst);
        assert_eq!(chat_calls, first.len());
        assert_eq!(embed_calls, first.len().div_ceil(4));

        let (second, report2) = ingest(&config, counter, chat.clone(), embed.clone(), &NoProgress)
            .await
            .unwrap();
        assert!(report2.cache_loaded);
        assert_eq!(second.len(), first.len());
        assert_eq!(report2.summary_hits, second.len());
        assert_eq!(report2.embedding_misses, 0);
        assert_eq!(chat.calls.load(Ordering::SeqCst), chat_calls);
        assert_eq!(embed.calls.load(Ordering::SeqCst), embed_calls);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn corrupt_cache_runs_uncached() {
        let tmp = TempDir::new().unwrap();
        let config = config_with_source(&tmp);
        std::fs::create_dir_all(config.paths.cache_file.parent().unwrap()).unwrap();
        std::fs::write(&config.paths.cache_file, "{{{{").unwrap();

        let chat = Arc::new(CountingSummarizer::default());
        let (nodes, report) = ingest(
            &config,
            TokenCounter::new().unwrap(),
            chat.clone(),
            Arc::new(CountingEmbedder::default()),
            &NoProgress,
        )
        .await
        .unwrap();
        assert!(!report.cache_loaded);
        assert_eq!(chat.calls.load(Ordering::SeqCst), nodes.len());

        let (reloaded, ok) = IngestionCache::load(&config.paths.cache_file);
        assert!(ok);
        assert_eq!(reloaded.len(), nodes.len() * 2);
    }

    #[test]
    fn fingerprint_separates_keys() {
        assert_ne!(cache_key("summary\0a", "h"), cache_key("summary\0b", "h"));
        assert_eq!(cache_key("x", "h"), cache_key("x", "h"));
    }
}

//! Retrieval-augmented question answering over the corpus index.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::{self, Embedder};
use crate::index::VectorIndex;
use crate::llm::{self, ChatModel};
use crate::models::ScoredNode;
use crate::prompts;

/// Reply used when retrieval finds nothing to ground an answer on.
pub const NO_CONTEXT_ANSWER: &str = "Không tìm thấy thông tin liên quan trong tài liệu.";

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<ScoredNode>,
}

pub struct QueryEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            top_k: top_k.max(1),
        }
    }

    /// Embed `question`, fetch the top-k chunks and synthesize an answer.
    pub async fn query(&self, question: &str) -> Result<QueryAnswer> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), question)
            .await
            .context("Embedding query failed")?;
        let sources = self.index.retrieve(&query_vec, self.top_k);
        debug!(hits = sources.len(), "retrieved corpus chunks");

        if sources.is_empty() {
            return Ok(QueryAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
            });
        }

        let prompt = prompts::render(
            prompts::QA_TEMPLATE,
            &[
                ("context_str", &context_block(&sources)),
                ("query_str", question),
            ],
        );
        let answer = llm::complete_prompt(self.chat.as_ref(), &prompt).await?;
        Ok(QueryAnswer { answer, sources })
    }
}

fn context_block(sources: &[ScoredNode]) -> String {
    sources
        .iter()
        .map(|s| match &s.summary {
            Some(summary) => format!("[{}]\nTóm tắt: {}\n\n{}", s.source_id, summary, s.text),
            None => format!("[{}]\n{}", s.source_id, s.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

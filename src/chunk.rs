//! Token-window text chunker.
//!
//! Splits document text into [`Node`]s of at most `chunk_size` tokens with
//! `chunk_overlap` tokens shared between consecutive windows. Windows break
//! on whitespace only; a single word longer than the window becomes a chunk
//! of its own. Each word is charged with the whitespace before it, so chunk
//! text keeps the source spacing. Tokens are counted with the `cl100k_base`
//! BPE.
//!
//! Each node receives a deterministic UUID derived from its source id and
//! index, plus a SHA-256 hash of its text for cache lookups.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Node;

/// BPE token counter shared by the chunker and the conversation memory.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<tiktoken_rs::CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCounter(cl100k_base)")
    }
}

pub struct Chunker {
    counter: TokenCounter,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(counter: TokenCounter, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            counter,
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split `text` into windows. Returns nodes with contiguous indices from 0;
    /// whitespace-only text yields no nodes.
    pub fn split(&self, source_id: &str, text: &str) -> Vec<Node> {
        let words = word_spans(text);
        if words.is_empty() {
            return Vec::new();
        }

        // A word is charged together with the whitespace run before it, so
        // newline and indent runs kept in the emitted span are counted too.
        let costs: Vec<usize> = words
            .iter()
            .enumerate()
            .map(|(i, &(_, e))| {
                let gap_start = if i == 0 { 0 } else { words[i - 1].1 };
                self.counter.count(&text[gap_start..e])
            })
            .collect();

        let mut nodes = Vec::new();
        let mut start = 0;
        loop {
            let mut end = start;
            let mut tokens = 0;
            while end < words.len() && (end == start || tokens + costs[end] <= self.chunk_size) {
                tokens += costs[end];
                end += 1;
            }

            let span = &text[words[start].0..words[end - 1].1];
            nodes.push(make_node(source_id, nodes.len() as i64, span));

            if end == words.len() {
                break;
            }

            let mut next = end;
            let mut overlap = 0;
            while next > start + 1 && overlap + costs[next - 1] <= self.chunk_overlap {
                overlap += costs[next - 1];
                next -= 1;
            }
            start = next;
        }
        nodes
    }
}

/// Byte ranges of the whitespace-separated words in `text`.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

pub fn node_id(source_id: &str, index: i64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{}#{}", source_id, index).as_bytes(),
    )
    .to_string()
}

pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn make_node(source_id: &str, index: i64, text: &str) -> Node {
    Node {
        id: node_id(source_id, index),
        source_id: source_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: content_hash(text),
        summary: None,
        embedding: None,
    }
}

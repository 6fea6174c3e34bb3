//! Fakes shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use mindcare::config::Config;
use mindcare::embedding::Embedder;
use mindcare::llm::{ChatModel, ChatRequest, ChatResponse, LlmError, Message, ToolCall};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

pub const CORPUS: &str = "\
Major depressive disorder: depressed mood most of the day, nearly every day, \
diminished interest or pleasure in activities, insomnia or hypersomnia, fatigue \
or loss of energy, feelings of worthlessness. Symptoms last at least two weeks. \
Generalized anxiety disorder: excessive anxiety and worry occurring more days \
than not for at least six months, restlessness, being easily fatigued, difficulty \
concentrating, irritability, muscle tension and sleep disturbance. \
Insomnia disorder: dissatisfaction with sleep quantity or quality, difficulty \
initiating sleep, difficulty maintaining sleep, early morning awakening.";

/// Config rooted in `root` with a small markdown corpus and small windows.
pub fn config_with_corpus(root: &Path) -> Config {
    let mut config = Config::rooted_at(root);
    let source = root.join("ingestion_storage/dsm5.md");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, CORPUS).unwrap();
    config.paths.source_files = vec![source];
    config.chunking.chunk_size = 32;
    config.chunking.chunk_overlap = 4;
    config
}

/// Deterministic bag-of-words embedder.
pub struct HashEmbedder;

impl HashEmbedder {
    pub const DIMS: usize = 16;
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embed"
    }

    fn dims(&self) -> usize {
        Self::DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; Self::DIMS];
                for word in text.split_whitespace() {
                    let bucket = word
                        .to_lowercase()
                        .bytes()
                        .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
                    v[bucket % Self::DIMS] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Chat model with a queue of replies for tool-offering (agent) requests.
///
/// Requests without tools (summaries, corpus answers) get a fixed reply so
/// they never consume the agent script.
pub struct ScriptedChat {
    agent_replies: Mutex<VecDeque<Message>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

pub const PROMPT_REPLY: &str = "Tóm tắt: rối loạn trầm cảm và lo âu.";

impl ScriptedChat {
    pub fn new(agent_replies: Vec<Message>) -> Self {
        Self {
            agent_replies: Mutex::new(agent_replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Message) {
        self.agent_replies.lock().unwrap().push_back(reply);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn tool_less_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tools.is_empty())
            .map(|r| r.messages[0].content.clone())
            .collect()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted-chat"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let offers_tools = !request.tools.is_empty();
        self.requests.lock().unwrap().push(request);
        let message = if offers_tools {
            self.agent_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Message::assistant("Mình vẫn đang lắng nghe bạn."))
        } else {
            Message::assistant(PROMPT_REPLY)
        };
        Ok(ChatResponse {
            message,
            finish_reason: None,
        })
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Message {
    Message::assistant_with_calls(
        "",
        vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    )
}

//! Tool-using conversational agent.
//!
//! An [`AgentRuntime`] holds what every conversation shares: the chat
//! model, the tool registry, the memory policy and the chat history file.
//! [`AgentRuntime::initialize`] binds it to one user and returns a
//! [`ConversationAgent`] whose [`ConversationAgent::chat`] runs one turn.
//!
//! # Turn
//!
//! 1. Load the user's history and cut it to the memory window.
//! 2. Send system instruction + window + user message + tool definitions.
//! 3. While the model asks for tools (up to `max_tool_rounds` rounds):
//!    dispatch each call through the registry and append the results as
//!    tool messages, then call the model again.
//! 4. If rounds run out, make one last call with no tools offered.
//! 5. Append the user message and the final reply to the chat store.
//!
//! Nothing is written to the chat store unless the turn succeeds. Tool side
//! effects (a saved score) happen when the tool runs and are not undone if
//! the final model call later fails.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chat_store::{self, ChatStore};
use crate::llm::{ChatModel, ChatRequest, LlmError, Message};
use crate::memory::ChatMemory;
use crate::models::ChatMessage;
use crate::prompts;
use crate::tools::{ToolContext, ToolRegistry};

pub struct AgentRuntime {
    chat: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    memory: ChatMemory,
    max_tool_rounds: usize,
    conversation_file: PathBuf,
}

/// One tool call made during a turn.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
}

impl AgentRuntime {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        memory: ChatMemory,
        max_tool_rounds: usize,
        conversation_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chat,
            tools,
            memory,
            max_tool_rounds: max_tool_rounds.max(1),
            conversation_file: conversation_file.into(),
        }
    }

    /// Bind the runtime to `username`, rendering the profile into the
    /// system instruction.
    pub fn initialize(&self, username: &str, profile_summary: &str) -> ConversationAgent<'_> {
        ConversationAgent {
            runtime: self,
            ctx: ToolContext::new(username),
            instruction: prompts::agent_instruction(profile_summary),
        }
    }
}

pub struct ConversationAgent<'a> {
    runtime: &'a AgentRuntime,
    ctx: ToolContext,
    instruction: String,
}

impl ConversationAgent<'_> {
    pub fn username(&self) -> &str {
        &self.ctx.username
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Run one turn for `text` and persist it on success.
    pub async fn chat(&self, text: &str) -> Result<AgentReply> {
        let rt = self.runtime;
        let username = self.username();

        let store = ChatStore::load(&rt.conversation_file);
        let history = store.get_messages(username);
        let window = rt.memory.window(history);
        debug!(
            username,
            history = history.len(),
            window = window.len(),
            "assembled memory window"
        );

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(Message::system(self.instruction.clone()));
        messages.extend(window.iter().map(Message::from));
        messages.push(Message::user(text));

        let definitions = rt.tools.definitions();
        let mut invocations = Vec::new();
        let mut reply = None;

        for round in 0..rt.max_tool_rounds {
            let response = rt
                .chat
                .complete(ChatRequest {
                    messages: messages.clone(),
                    tools: definitions.clone(),
                })
                .await
                .with_context(|| format!("chat model call failed (round {})", round + 1))?;

            let message = response.message;
            if message.tool_calls.is_empty() {
                reply = Some(message.content);
                break;
            }

            let calls = message.tool_calls.clone();
            messages.push(message);
            for call in &calls {
                let outcome = rt.tools.dispatch(call, &self.ctx).await;
                debug!(tool = %call.name, is_error = outcome.is_error, "tool call finished");
                invocations.push(ToolInvocation {
                    name: call.name.clone(),
                    is_error: outcome.is_error,
                });
                messages.push(Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    outcome.content,
                    outcome.is_error,
                ));
            }
        }

        let content = match reply {
            Some(content) => content,
            None => {
                warn!(
                    username,
                    rounds = rt.max_tool_rounds,
                    "tool round limit reached, asking for a final answer"
                );
                let response = rt
                    .chat
                    .complete(ChatRequest {
                        messages,
                        tools: Vec::new(),
                    })
                    .await
                    .context("chat model call failed (final answer)")?;
                response.message.content
            }
        };

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse("model returned an empty reply".to_string()).into());
        }

        chat_store::update(&rt.conversation_file, |s| {
            s.add_message(username, ChatMessage::user(text));
            s.add_message(username, ChatMessage::assistant(content.clone()));
        })?;
        info!(username, tools = invocations.len(), "turn completed");

        Ok(AgentReply {
            content,
            tool_calls: invocations,
        })
    }
}

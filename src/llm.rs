//! Chat-completion client with tool calling.
//!
//! [`ChatModel`] is the seam the agent, the query engine and the ingestion
//! summarizer talk to. [`OpenAiChatModel`] speaks the OpenAI-compatible
//! `/chat/completions` wire format; [`DisabledChatModel`] fails every call.
//! Tests substitute scripted implementations of the trait.
//!
//! Each request is sent once. There is no retry or backoff; a failure is
//! returned as [`LlmError`] and the caller decides what to do with it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments; a string if the model sent invalid JSON.
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn plain(role: MessageRole, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, text.into())
    }

    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(MessageRole::Assistant, text.into())
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            is_error,
            ..Self::plain(MessageRole::Tool, text.into())
        }
    }
}

impl From<&crate::models::ChatMessage> for Message {
    fn from(m: &crate::models::ChatMessage) -> Self {
        match m.role {
            crate::models::ChatRole::User => Message::user(m.content.clone()),
            crate::models::ChatRole::Assistant => Message::assistant(m.content.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat model is disabled")]
    Disabled,
    #[error("missing API key (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, part of the ingestion cache fingerprint.
    fn model_name(&self) -> &str;
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Single-prompt completion without tools. Returns the reply text.
pub async fn complete_prompt(model: &dyn ChatModel, prompt: &str) -> Result<String, LlmError> {
    let response = model
        .complete(ChatRequest {
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
        })
        .await?;
    Ok(response.message.content)
}

// ============ Disabled ============

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiChatModel {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    api_base: String,
}

impl OpenAiChatModel {
    /// Build a client from config. The API key comes from `OPENAI_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        Self::with_api_key(config, &api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| LlmError::MissingApiKey)?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = build_chat_request_body(&self.model, self.temperature, &request)?;
        let response = self
            .client
            .post(self.chat_completions_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }
        parse_chat_response(&raw)
    }
}

fn build_chat_request_body(
    model: &str,
    temperature: f32,
    request: &ChatRequest,
) -> Result<Value, LlmError> {
    let mut body = json!({
        "model": model,
        "messages": to_openai_messages(&request.messages)?,
        "temperature": temperature,
    });
    if !request.tools.is_empty() {
        body["tools"] = to_openai_tools(&request.tools);
    }
    Ok(body)
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<Value>, LlmError> {
    let mut serialized = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            MessageRole::System => serialized.push(json!({
                "role": "system",
                "content": message.content,
            })),
            MessageRole::User => serialized.push(json!({
                "role": "user",
                "content": message.content,
            })),
            MessageRole::Assistant if message.tool_calls.is_empty() => serialized.push(json!({
                "role": "assistant",
                "content": message.content,
            })),
            MessageRole::Assistant => {
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": stringify_tool_arguments(&call.arguments),
                            }
                        })
                    })
                    .collect();
                let content = if message.content.trim().is_empty() {
                    Value::Null
                } else {
                    Value::String(message.content.clone())
                };
                serialized.push(json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tool_calls,
                }));
            }
            MessageRole::Tool => {
                let Some(tool_call_id) = message.tool_call_id.as_deref() else {
                    return Err(LlmError::InvalidResponse(
                        "tool message is missing tool_call_id".to_string(),
                    ));
                };
                serialized.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": message.content,
                }));
            }
        }
    }

    Ok(serialized)
}

fn stringify_tool_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(value) => value.clone(),
        value => value.to_string(),
    }
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, LlmError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|call| call.call_type == "function")
        .map(|call| {
            let arguments = match serde_json::from_str::<Value>(&call.function.arguments) {
                Ok(value) => value,
                Err(_) => Value::String(call.function.arguments),
            };
            ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ChatResponse {
        message: Message::assistant_with_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ),
        finish_reason: choice.finish_reason,
    })
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

/// Create the chat model named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

//! Agent tools and their validated dispatch.
//!
//! The chat model picks tools by name and supplies JSON arguments; both are
//! untrusted. [`ToolRegistry::dispatch`] resolves the name, checks the
//! arguments against the tool's JSON Schema with [`validate_params`] and
//! only then executes. Every failure becomes an error result fed back to the
//! model instead of aborting the turn.
//!
//! ```text
//! ToolCall { name, arguments }
//!        │
//!        ▼
//!   find(name) ──none──▶ "unknown tool" (is_error)
//!        │
//!   validate_params ──err──▶ message (is_error)
//!        │
//!   execute(params, ctx) ──err──▶ message (is_error)
//!        │
//!        ▼
//!   ToolOutcome { content }
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::{ToolCall, ToolDefinition};
use crate::models::ScoreLabel;
use crate::prompts;
use crate::query::QueryEngine;
use crate::scores::{self, ScoreStore};

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// OpenAI function-calling JSON Schema for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with parameters already checked by [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Per-turn context handed to tools. Carries the session identity so tools
/// never rely on ambient state to know whom they act for.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub username: String,
}

impl ToolContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// Result of one dispatched call, ready to become a tool message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    fn error(content: String) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. A later tool with the same name is ignored.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if self.find(tool.name()).is_some() {
            warn!(tool = tool.name(), "duplicate tool name, ignoring");
            return;
        }
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Definitions advertised to the chat model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Resolve, validate and execute one model-issued call.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        let Some(tool) = self.find(&call.name) else {
            warn!(tool = %call.name, "model requested an unknown tool");
            let known: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
            return ToolOutcome::error(format!(
                "unknown tool '{}'; available tools: {}",
                call.name,
                known.join(", ")
            ));
        };

        let params = match validate_params(&tool.parameters_schema(), &call.arguments) {
            Ok(p) => p,
            Err(e) => {
                debug!(tool = %call.name, error = %e, "rejected tool arguments");
                return ToolOutcome::error(format!("invalid arguments for {}: {}", call.name, e));
            }
        };

        match tool.execute(params, ctx).await {
            Ok(Value::String(s)) => ToolOutcome::ok(s),
            Ok(other) => ToolOutcome::ok(other.to_string()),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolOutcome::error(format!("{} failed: {}", call.name, e))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter Validation
// ═══════════════════════════════════════════════════════════════════════

/// Validate `params` against a tool's JSON Schema.
///
/// Checks that params is an object, required fields are present, values
/// match their declared `type`, and string values belong to `enum` (compared
/// case-insensitively, ignoring surrounding whitespace). Absent properties
/// with a `default` are filled in.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        Value::String(_) => bail!("arguments are not valid JSON"),
        other => bail!("arguments must be a JSON object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected_type {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected_type,
                    json_type_name(value)
                );
            }
        }

        if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !enum_contains(enum_values, value) {
                let allowed: Vec<String> = enum_values.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    allowed.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn enum_contains(allowed: &[Value], value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let needle = s.trim().to_lowercase();
            allowed
                .iter()
                .any(|a| a.as_str().is_some_and(|a| a.to_lowercase() == needle))
        }
        other => allowed.contains(other),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Corpus Query Tool
// ═══════════════════════════════════════════════════════════════════════

/// Read-only question answering over the DSM-5 corpus.
///
/// Holds `None` when no index could be loaded; calls then fail with a hint
/// to build it, and the model carries on without the corpus.
pub struct CorpusQueryTool {
    engine: Option<Arc<QueryEngine>>,
}

impl CorpusQueryTool {
    pub const NAME: &'static str = "dsm5";

    pub fn new(engine: Option<Arc<QueryEngine>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CorpusQueryTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        prompts::DSM5_TOOL_DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Câu hỏi văn bản thuần túy chi tiết"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
        let question = params["input"].as_str().unwrap_or("").trim();
        if question.is_empty() {
            bail!("input must not be empty");
        }
        let Some(engine) = &self.engine else {
            bail!("the DSM-5 index is not available; run `mindcare build` first");
        };
        let answer = engine.query(question).await?;
        Ok(Value::String(answer.answer))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Save Score Tool
// ═══════════════════════════════════════════════════════════════════════

/// Appends one assessment for the session user to the score store.
pub struct SaveScoreTool {
    store: Arc<ScoreStore>,
}

impl SaveScoreTool {
    pub const NAME: &'static str = "save_score";

    pub fn new(store: Arc<ScoreStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveScoreTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        prompts::SAVE_SCORE_TOOL_DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        let labels: Vec<&str> = ScoreLabel::ALL.iter().map(|l| l.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "score": {
                    "type": "string",
                    "enum": labels,
                    "description": "Điểm số (kém/trung bình/bình thường/tốt)"
                },
                "content": {
                    "type": "string",
                    "description": "Nội dung chi tiết chẩn đoán"
                },
                "total_guess": {
                    "type": "string",
                    "description": "Tổng đoán về tình trạng"
                }
            },
            "required": ["score", "content", "total_guess"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let raw_score = params["score"].as_str().unwrap_or_default();
        let Some(label) = ScoreLabel::parse(raw_score) else {
            bail!("unknown score label '{}'", raw_score);
        };
        let record = scores::new_record(
            &ctx.username,
            label,
            params["content"].as_str().unwrap_or_default(),
            params["total_guess"].as_str().unwrap_or_default(),
            chrono::Local::now().naive_local(),
        );
        self.store.append(record)?;
        info!(username = %ctx.username, score = %label, "score persisted");
        Ok(Value::String(format!(
            "Đã lưu kết quả chẩn đoán cho {}",
            ctx.username
        )))
    }
}

/// The two tools every conversation gets.
pub fn default_registry(engine: Option<Arc<QueryEngine>>, scores: Arc<ScoreStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CorpusQueryTool::new(engine)));
    registry.register(Box::new(SaveScoreTool::new(scores)));
    registry
}

//! The library boundary a UI talks to.
//!
//! [`CareService`] wires the stores, the index and the agent together.
//! Per-user state never lives in the service: callers obtain a
//! [`SessionContext`] from [`CareService::login`] (or
//! [`CareService::session_for`]) and pass it with every chat request.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::agent::{AgentReply, AgentRuntime};
use crate::auth::{AuthError, CredentialStore};
use crate::chat_store::{self, ChatStore};
use crate::chunk::TokenCounter;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{VectorIndex, DEFAULT_INDEX_ID};
use crate::llm::{self, ChatModel, LlmError};
use crate::memory::ChatMemory;
use crate::models::{ChatMessage, ScoreRecord, UserProfile};
use crate::query::QueryEngine;
use crate::scores::{self, HealthSummary, ScoreFilter, ScoreStore};
use crate::tools;

/// Identity of the user a request acts for.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub username: String,
    pub profile: UserProfile,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Invalid(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("model call failed: {0}")]
    Model(#[source] LlmError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Route an agent failure: model errors stay recognisable, the rest is
    /// internal.
    fn from_turn(err: anyhow::Error) -> Self {
        match err.downcast::<LlmError>() {
            Ok(e) => ServiceError::Model(e),
            Err(other) => ServiceError::Internal(other),
        }
    }
}

pub struct CareService {
    credentials: CredentialStore,
    scores: Arc<ScoreStore>,
    conversation_file: PathBuf,
    runtime: AgentRuntime,
    index_available: bool,
}

impl CareService {
    /// Build the model clients from config, load the index and assemble.
    pub async fn open(config: &Config) -> Result<Self> {
        let chat = llm::create_chat_model(&config.llm)?;
        let embedder = embedding::create_embedder(&config.embedding)?;
        Self::open_with(config, chat, embedder).await
    }

    /// Like [`CareService::open`] with caller-supplied model clients.
    ///
    /// A missing or unusable index is not fatal: the service starts and the
    /// corpus tool reports the index as unavailable.
    pub async fn open_with(
        config: &Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let index_path = config.paths.index_db();
        let index = match VectorIndex::load(&index_path, DEFAULT_INDEX_ID).await {
            Ok(index) if index.embed_model() == embedder.model_name() => {
                info!(path = %index_path.display(), nodes = index.len(), "index loaded");
                Some(Arc::new(index))
            }
            Ok(index) => {
                warn!(
                    found = index.embed_model(),
                    expected = embedder.model_name(),
                    "index embedded with another model; run `mindcare build`"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "index unavailable; run `mindcare build`");
                None
            }
        };
        Self::new(config, chat, embedder, index, TokenCounter::new()?)
    }

    pub fn new(
        config: &Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        index: Option<Arc<VectorIndex>>,
        counter: TokenCounter,
    ) -> Result<Self> {
        let scores = Arc::new(ScoreStore::new(&config.paths.scores_file));
        let index_available = index.is_some();
        let engine = index.map(|index| {
            Arc::new(QueryEngine::new(
                index,
                embedder,
                chat.clone(),
                config.retrieval.similarity_top_k,
            ))
        });
        let registry = tools::default_registry(engine, scores.clone());
        let runtime = AgentRuntime::new(
            chat,
            Arc::new(registry),
            ChatMemory::new(counter, config.agent.memory_token_limit),
            config.agent.max_tool_rounds,
            config.paths.conversation_file.clone(),
        );

        Ok(Self {
            credentials: CredentialStore::new(&config.paths.users_file),
            scores,
            conversation_file: config.paths.conversation_file.clone(),
            runtime,
            index_available,
        })
    }

    pub fn index_available(&self) -> bool {
        self.index_available
    }

    // ============ Accounts ============

    pub fn register(
        &self,
        username: &str,
        password: &str,
        profile: UserProfile,
    ) -> Result<(), ServiceError> {
        self.credentials.register(username, password, profile)?;
        Ok(())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<SessionContext, ServiceError> {
        match self.credentials.login(username, password)? {
            Some(profile) => Ok(SessionContext {
                username: username.to_string(),
                profile,
            }),
            None => Err(ServiceError::InvalidCredentials),
        }
    }

    /// Session for a known user without checking a password.
    pub fn session_for(&self, username: &str) -> Result<SessionContext, ServiceError> {
        match self.credentials.get_user_info(username)? {
            Some(profile) => Ok(SessionContext {
                username: username.to_string(),
                profile,
            }),
            None => Err(ServiceError::UnknownUser(username.to_string())),
        }
    }

    // ============ Chat ============

    pub fn get_history(&self, username: &str) -> Vec<ChatMessage> {
        ChatStore::load(&self.conversation_file)
            .get_messages(username)
            .to_vec()
    }

    pub async fn send_message(
        &self,
        session: &SessionContext,
        text: &str,
    ) -> Result<AgentReply, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::Invalid("message must not be empty".to_string()));
        }
        let agent = self
            .runtime
            .initialize(&session.username, &session.profile.summary());
        agent.chat(text).await.map_err(ServiceError::from_turn)
    }

    /// Delete a user's history. Returns how many messages were removed.
    pub fn clear_history(&self, username: &str) -> Result<usize, ServiceError> {
        let mut removed = 0;
        chat_store::update(&self.conversation_file, |s| {
            removed = s.delete_messages(username).len();
        })?;
        info!(username, removed, "cleared chat history");
        Ok(removed)
    }

    // ============ Scores ============

    pub fn list_scores(&self, username: &str) -> Vec<ScoreRecord> {
        self.scores.list_for(username)
    }

    pub fn list_scores_filtered(&self, username: &str, filter: &ScoreFilter) -> Vec<ScoreRecord> {
        filter.apply(self.scores.list_for(username))
    }

    pub fn health_summary(&self, username: &str) -> HealthSummary {
        let records = self.scores.list_for(username);
        scores::health_summary(&records, chrono::Local::now().naive_local())
    }
}

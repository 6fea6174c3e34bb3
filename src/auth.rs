//! Credential store backed by a flat YAML mapping.
//!
//! ```yaml
//! alice:
//!   password: 2bb80d53...   # hex SHA-256, unsalted
//!   email: alice@example.com
//!   age: '30'
//!   gender: Nữ
//! ```
//!
//! The whole file is read and rewritten on every registration. Nothing
//! coordinates concurrent writers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::UserProfile;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username '{0}' already exists")]
    UsernameTaken(String),
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// On-disk shape of one user entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    password: String,
    #[serde(flatten)]
    profile: UserProfile,
}

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Register a new user. The existing entry is never overwritten.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        profile: UserProfile,
    ) -> Result<(), AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let mut users = self.load();
        if users.contains_key(username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        users.insert(
            username.to_string(),
            UserRecord {
                password: hash_password(password),
                profile,
            },
        );
        self.save(&users)?;
        info!(username, "registered user");
        Ok(())
    }

    /// Check credentials. Returns the profile on success, `None` otherwise.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<UserProfile>> {
        let users = self.load();
        let Some(record) = users.get(username) else {
            return Ok(None);
        };
        if record.password == hash_password(password) {
            Ok(Some(record.profile.clone()))
        } else {
            Ok(None)
        }
    }

    pub fn get_user_info(&self, username: &str) -> Result<Option<UserProfile>> {
        Ok(self.load().get(username).map(|r| r.profile.clone()))
    }

    pub fn exists(&self, username: &str) -> bool {
        self.load().contains_key(username)
    }

    fn load(&self) -> BTreeMap<String, UserRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };
        if content.trim().is_empty() {
            return BTreeMap::new();
        }
        match serde_yaml::from_str::<Option<BTreeMap<String, UserRecord>>>(&content) {
            Ok(users) => users.unwrap_or_default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "credential file unreadable, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn save(&self, users: &BTreeMap<String, UserRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(users)?;
        std::fs::write(&self.path, yaml)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Unsalted hex SHA-256, kept for compatibility with existing credential files.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

//! First-run setup: data directories and empty store files.
//!
//! Idempotent. Existing files are never overwritten, so running
//! `mindcare setup` on a live deployment only fills in what is missing.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;

#[derive(Debug, Default)]
pub struct SetupReport {
    pub created_dirs: Vec<PathBuf>,
    pub created_files: Vec<PathBuf>,
}

/// Create every directory the configured paths live in, plus an empty score
/// array and an empty credential mapping.
pub fn run_setup(config: &Config) -> Result<SetupReport> {
    let paths = &config.paths;
    let mut report = SetupReport::default();

    let mut dirs: Vec<PathBuf> = vec![paths.index_dir.clone()];
    dirs.extend(
        [
            paths.cache_file.as_path(),
            paths.conversation_file.as_path(),
            paths.scores_file.as_path(),
            paths.users_file.as_path(),
        ]
        .iter()
        .filter_map(|p| p.parent().map(Path::to_path_buf)),
    );
    dirs.extend(
        paths
            .source_files
            .iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf)),
    );
    if let Some(dir) = &paths.source_dir {
        dirs.push(dir.clone());
    }
    dirs.retain(|d| !d.as_os_str().is_empty());
    dirs.sort();
    dirs.dedup();

    for dir in dirs {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            info!(dir = %dir.display(), "created directory");
            report.created_dirs.push(dir);
        }
    }

    for (file, content) in [(&paths.scores_file, "[]"), (&paths.users_file, "{}\n")] {
        if !file.exists() {
            std::fs::write(file, content)
                .with_context(|| format!("Failed to create file: {}", file.display()))?;
            info!(file = %file.display(), "created empty store");
            report.created_files.push(file.clone());
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;
    use crate::scores::ScoreStore;
    use tempfile::TempDir;

    #[test]
    fn creates_layout_and_empty_stores() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(&tmp.path().join("data"));
        let report = run_setup(&config).unwrap();

        assert!(config.paths.index_dir.is_dir());
        assert!(tmp.path().join("data/cache").is_dir());
        assert!(tmp.path().join("data/ingestion_storage").is_dir());
        assert_eq!(report.created_files.len(), 2);

        assert!(ScoreStore::new(&config.paths.scores_file).load_all().is_empty());
        assert!(!CredentialStore::new(&config.paths.users_file).exists("alice"));
    }

    #[test]
    fn second_run_keeps_existing_files() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        run_setup(&config).unwrap();
        std::fs::write(&config.paths.scores_file, "[{\"keep\": true}]").unwrap();

        let report = run_setup(&config).unwrap();
        assert!(report.created_dirs.is_empty());
        assert!(report.created_files.is_empty());
        let raw = std::fs::read_to_string(&config.paths.scores_file).unwrap();
        assert!(raw.contains("keep"));
    }
}

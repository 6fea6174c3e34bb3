//! Source document loading.
//!
//! Documents come from the explicit `paths.source_files` list plus, when set,
//! every file under `paths.source_dir` matching `paths.include_globs`. Each
//! document's id is its file name, so re-ingesting the same file yields the
//! same node ids.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::PathsConfig;
use crate::extract::{self, ExtractError};
use crate::models::SourceDocument;

/// Collect candidate source paths, deduplicated and sorted.
pub fn discover(paths: &PathsConfig) -> Result<Vec<PathBuf>> {
    let mut found: BTreeSet<PathBuf> = paths.source_files.iter().cloned().collect();

    if let Some(root) = &paths.source_dir {
        if !root.exists() {
            anyhow::bail!("source_dir does not exist: {}", root.display());
        }
        let include = build_globset(&paths.include_globs)?;
        let exclude = build_globset(&["**/.*/**".to_string(), "**/~$*".to_string()])?;

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap_or(path);
            let rel_str = rel.to_string_lossy();
            if exclude.is_match(rel_str.as_ref()) || !include.is_match(rel_str.as_ref()) {
                continue;
            }
            found.insert(path.to_path_buf());
        }
    }

    Ok(found.into_iter().collect())
}

/// Read one document. DOCX/PDF go through [`extract`]; anything else is UTF-8.
pub fn load_document(path: &Path) -> Result<SourceDocument> {
    let content_type = extract::content_type_for_path(path);
    let body = if extract::is_binary(content_type) {
        let bytes = std::fs::read(path)?;
        extract::extract_text(&bytes, content_type)?
    } else {
        std::fs::read_to_string(path)?
    };

    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(SourceDocument {
        id,
        path: path.display().to_string(),
        content_type: content_type.to_string(),
        body,
    })
}

/// Load every discovered document, skipping the unreadable ones.
///
/// Two files with the same name in different directories would share an id;
/// the later one is skipped.
pub fn load_documents(paths: &PathsConfig) -> Result<Vec<SourceDocument>> {
    let mut docs: Vec<SourceDocument> = Vec::new();
    let mut seen = BTreeSet::new();

    for path in discover(paths)? {
        match load_document(&path) {
            Ok(doc) if doc.body.trim().is_empty() => {
                warn!(path = %path.display(), "document has no text, skipping");
            }
            Ok(doc) => {
                if !seen.insert(doc.id.clone()) {
                    warn!(path = %path.display(), id = %doc.id, "duplicate document id, skipping");
                    continue;
                }
                debug!(id = %doc.id, bytes = doc.body.len(), "loaded document");
                docs.push(doc);
            }
            Err(e) => match e.downcast_ref::<ExtractError>() {
                Some(extract_err) => {
                    warn!(path = %path.display(), error = %extract_err, "extraction failed, skipping")
                }
                None => warn!(path = %path.display(), error = %e, "unreadable document, skipping"),
            },
        }
    }

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

//! Vector index over embedded nodes, persisted as a SQLite snapshot.
//!
//! The index is built once from ingestion output and reloaded afterwards;
//! it is never updated in place. Retrieval is an exhaustive cosine scan in
//! memory, which is plenty for a single reference corpus.
//!
//! # Snapshot layout
//!
//! ```text
//! index_store(index_id PK, created_at, node_count, embed_model, dims)
//! nodes(id PK, index_id, source_id, chunk_index, text, summary, hash, embedding BLOB)
//! ```
//!
//! A snapshot must contain exactly the rows its `index_store.node_count`
//! announces, each embedding decoding to `dims` floats. Anything else is
//! [`IndexLoadError::Corrupt`].

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Node, ScoredNode};

/// The one index id the service expects in a snapshot.
pub const DEFAULT_INDEX_ID: &str = "vector";

#[derive(Debug, Error)]
pub enum IndexLoadError {
    #[error("no index snapshot at {0}")]
    Missing(PathBuf),
    #[error("snapshot has no index '{expected}' (found: {found:?})")]
    IdMismatch { expected: String, found: Vec<String> },
    #[error("index snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Loaded,
    Built,
}

impl IndexOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexOrigin::Loaded => "loaded",
            IndexOrigin::Built => "built",
        }
    }
}

#[derive(Debug)]
pub struct IndexHandle {
    pub index: VectorIndex,
    pub origin: IndexOrigin,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    index_id: String,
    embed_model: String,
    dims: usize,
    nodes: Vec<Node>,
}

impl VectorIndex {
    /// Build an in-memory index. Every node must carry an embedding of the
    /// same length.
    pub fn from_nodes(index_id: &str, embed_model: &str, nodes: Vec<Node>) -> Result<Self> {
        let mut dims = None;
        for node in &nodes {
            let Some(embedding) = &node.embedding else {
                anyhow::bail!("node {} has no embedding", node.id);
            };
            match dims {
                None => dims = Some(embedding.len()),
                Some(d) if d != embedding.len() => anyhow::bail!(
                    "node {} has {} dimensions, expected {}",
                    node.id,
                    embedding.len(),
                    d
                ),
                _ => {}
            }
        }

        Ok(Self {
            index_id: index_id.to_string(),
            embed_model: embed_model.to_string(),
            dims: dims.unwrap_or(0),
            nodes,
        })
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Top `top_k` nodes by cosine similarity, ties broken by node id.
    pub fn retrieve(&self, query: &[f32], top_k: usize) -> Vec<ScoredNode> {
        let mut scored: Vec<ScoredNode> = self
            .nodes
            .iter()
            .filter_map(|node| {
                let embedding = node.embedding.as_deref()?;
                Some(ScoredNode {
                    id: node.id.clone(),
                    source_id: node.source_id.clone(),
                    text: node.text.clone(),
                    summary: node.summary.clone(),
                    score: cosine_similarity(query, embedding),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);
        scored
    }

    /// Write a fresh snapshot at `path`, replacing whatever was there.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        db::remove_database(path)?;
        let pool = db::connect(path, true)
            .await
            .with_context(|| format!("Failed to create index at {}", path.display()))?;
        let result = self.write_rows(&pool).await;
        if result.is_ok() {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(&pool)
                .await?;
        }
        pool.close().await;
        result
    }

    async fn write_rows(&self, pool: &SqlitePool) -> Result<()> {
        migrate::run_migrations(pool).await?;

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO index_store (index_id, created_at, node_count, embed_model, dims) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&self.index_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(self.nodes.len() as i64)
        .bind(&self.embed_model)
        .bind(self.dims as i64)
        .execute(&mut *tx)
        .await?;

        for node in &self.nodes {
            let blob = vec_to_blob(node.embedding.as_deref().unwrap_or_default());
            sqlx::query(
                "INSERT INTO nodes (id, index_id, source_id, chunk_index, text, summary, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&node.id)
            .bind(&self.index_id)
            .bind(&node.source_id)
            .bind(node.chunk_index)
            .bind(&node.text)
            .bind(&node.summary)
            .bind(&node.hash)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load the snapshot at `path`, requiring an index with `index_id`.
    pub async fn load(path: &Path, index_id: &str) -> Result<Self, IndexLoadError> {
        if !path.exists() {
            return Err(IndexLoadError::Missing(path.to_path_buf()));
        }
        let pool = db::connect(path, false).await?;
        let result = read_snapshot(&pool, index_id).await;
        pool.close().await;
        result
    }
}

type NodeRow = (String, String, i64, String, Option<String>, String, Vec<u8>);

async fn read_snapshot(pool: &SqlitePool, index_id: &str) -> Result<VectorIndex, IndexLoadError> {
    let corrupt = |e: sqlx::Error| IndexLoadError::Corrupt(e.to_string());

    let ids: Vec<String> = sqlx::query_scalar("SELECT index_id FROM index_store ORDER BY index_id")
        .fetch_all(pool)
        .await
        .map_err(corrupt)?;

    let header: Option<(i64, String, i64)> = sqlx::query_as(
        "SELECT node_count, embed_model, dims FROM index_store WHERE index_id = ?",
    )
    .bind(index_id)
    .fetch_optional(pool)
    .await
    .map_err(corrupt)?;

    let Some((node_count, embed_model, dims)) = header else {
        return Err(IndexLoadError::IdMismatch {
            expected: index_id.to_string(),
            found: ids,
        });
    };

    let rows: Vec<NodeRow> = sqlx::query_as(
        "SELECT id, source_id, chunk_index, text, summary, hash, embedding \
         FROM nodes WHERE index_id = ? ORDER BY source_id, chunk_index",
    )
    .bind(index_id)
    .fetch_all(pool)
    .await
    .map_err(corrupt)?;

    if rows.len() as i64 != node_count {
        return Err(IndexLoadError::Corrupt(format!(
            "header announces {} nodes, found {}",
            node_count,
            rows.len()
        )));
    }

    let mut nodes = Vec::with_capacity(rows.len());
    for (id, source_id, chunk_index, text, summary, hash, blob) in rows {
        let embedding = match blob_to_vec(&blob) {
            Some(v) if v.len() as i64 == dims => v,
            _ => {
                return Err(IndexLoadError::Corrupt(format!(
                    "node {} has a malformed embedding",
                    id
                )))
            }
        };
        nodes.push(Node {
            id,
            source_id,
            chunk_index,
            text,
            hash,
            summary,
            embedding: Some(embedding),
        });
    }

    Ok(VectorIndex {
        index_id: index_id.to_string(),
        embed_model,
        dims: dims.max(0) as usize,
        nodes,
    })
}

/// Load the snapshot at `path` or, on any load failure, build a new index
/// from `nodes` and persist it in place of the old one.
///
/// A snapshot embedded with a different model than `embed_model` is also
/// rebuilt, since its vectors are not comparable with new queries.
pub async fn build_or_load(path: &Path, nodes: Vec<Node>, embed_model: &str) -> Result<IndexHandle> {
    match VectorIndex::load(path, DEFAULT_INDEX_ID).await {
        Ok(index) if index.embed_model() == embed_model => {
            info!(path = %path.display(), nodes = index.len(), "loaded existing index");
            return Ok(IndexHandle {
                index,
                origin: IndexOrigin::Loaded,
            });
        }
        Ok(index) => warn!(
            found = index.embed_model(),
            expected = embed_model,
            "index was built with another embedding model, rebuilding"
        ),
        Err(IndexLoadError::Missing(_)) => info!(path = %path.display(), "no index found, building"),
        Err(e) => warn!(error = %e, "index unusable, rebuilding"),
    }

    let index = VectorIndex::from_nodes(DEFAULT_INDEX_ID, embed_model, nodes)?;
    index.persist(path).await?;
    info!(path = %path.display(), nodes = index.len(), "built and persisted index");
    Ok(IndexHandle {
        index,
        origin: IndexOrigin::Built,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{content_hash, node_id};
    use tempfile::TempDir;

    fn node(source: &str, idx: i64, embedding: Vec<f32>) -> Node {
        let text = format!("{} chunk {}", source, idx);
        Node {
            id: node_id(source, idx),
            source_id: source.to_string(),
            chunk_index: idx,
            hash: content_hash(&text),
            text,
            summary: Some("tóm tắt".to_string()),
            embedding: Some(embedding),
        }
    }

    fn sample() -> Vec<Node> {
        vec![
            node("dsm5.docx", 0, vec![1.0, 0.0]),
            node("dsm5.docx", 1, vec![0.0, 1.0]),
            node("dsm5.docx", 2, vec![0.7, 0.7]),
        ]
    }

    #[tokio::test]
    async fn build_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index_storage/index.sqlite");

        let built = build_or_load(&path, sample(), "fake").await.unwrap();
        assert_eq!(built.origin, IndexOrigin::Built);
        assert_eq!(built.index.len(), 3);

        let loaded = build_or_load(&path, Vec::new(), "fake").await.unwrap();
        assert_eq!(loaded.origin, IndexOrigin::Loaded);
        assert_eq!(loaded.index.nodes(), built.index.nodes());
        assert_eq!(loaded.index.dims(), 2);
    }

    #[tokio::test]
    async fn missing_snapshot_is_typed() {
        let tmp = TempDir::new().unwrap();
        let err = VectorIndex::load(&tmp.path().join("none.sqlite"), DEFAULT_INDEX_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexLoadError::Missing(_)));
    }

    #[tokio::test]
    async fn other_index_id_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        VectorIndex::from_nodes("summary", "fake", sample())
            .unwrap()
            .persist(&path)
            .await
            .unwrap();

        let err = VectorIndex::load(&path, DEFAULT_INDEX_ID).await.unwrap_err();
        match err {
            IndexLoadError::IdMismatch { expected, found } => {
                assert_eq!(expected, "vector");
                assert_eq!(found, vec!["summary".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let handle = build_or_load(&path, sample(), "fake").await.unwrap();
        assert_eq!(handle.origin, IndexOrigin::Built);
        assert!(VectorIndex::load(&path, DEFAULT_INDEX_ID).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_file_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        std::fs::write(&path, b"definitely not sqlite, just some bytes padding it out").unwrap();

        let err = VectorIndex::load(&path, DEFAULT_INDEX_ID).await.unwrap_err();
        assert!(matches!(
            err,
            IndexLoadError::Corrupt(_) | IndexLoadError::Storage(_)
        ));

        let handle = build_or_load(&path, sample(), "fake").await.unwrap();
        assert_eq!(handle.origin, IndexOrigin::Built);
        let reloaded = build_or_load(&path, Vec::new(), "fake").await.unwrap();
        assert_eq!(reloaded.origin, IndexOrigin::Loaded);
    }

    #[tokio::test]
    async fn embedding_model_change_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        build_or_load(&path, sample(), "model-a").await.unwrap();
        let handle = build_or_load(&path, sample(), "model-b").await.unwrap();
        assert_eq!(handle.origin, IndexOrigin::Built);
        assert_eq!(handle.index.embed_model(), "model-b");
    }

    #[test]
    fn retrieve_orders_by_score_then_id() {
        let mut nodes = sample();
        // Duplicate direction of node 0 under a different source to force a tie.
        nodes.push(node("a.txt", 0, vec![2.0, 0.0]));
        let index = VectorIndex::from_nodes("vector", "fake", nodes).unwrap();

        let hits = index.retrieve(&[1.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 1.0).abs() < 1e-6);
        assert!(hits[0].id < hits[1].id);
        assert_eq!(hits[2].text, "dsm5.docx chunk 2");

        assert_eq!(index.retrieve(&[1.0, 0.0], 10).len(), 4);
    }

    #[test]
    fn empty_index_retrieves_nothing() {
        let index = VectorIndex::from_nodes("vector", "fake", Vec::new()).unwrap();
        assert!(index.retrieve(&[1.0], 3).is_empty());
    }

    #[test]
    fn nodes_without_embeddings_are_rejected() {
        let mut n = node("x", 0, vec![1.0]);
        n.embedding = None;
        assert!(VectorIndex::from_nodes("vector", "fake", vec![n]).is_err());
        let mixed = vec![node("x", 0, vec![1.0]), node("x", 1, vec![1.0, 2.0])];
        assert!(VectorIndex::from_nodes("vector", "fake", mixed).is_err());
    }
}

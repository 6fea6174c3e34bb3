mod common;

use common::{config_with_corpus, HashEmbedder, ScriptedChat};
use mindcare::build::run_build_with;
use mindcare::index::{IndexLoadError, IndexOrigin, VectorIndex, DEFAULT_INDEX_ID};
use mindcare::progress::NoProgress;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn first_build_creates_index_and_cache() {
    let tmp = TempDir::new().unwrap();
    let config = config_with_corpus(tmp.path());
    let chat = Arc::new(ScriptedChat::new(Vec::new()));

    let report = run_build_with(&config, chat.clone(), Arc::new(HashEmbedder), &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.origin, IndexOrigin::Built);
    assert_eq!(report.ingest.documents, 1);
    assert!(report.ingest.nodes > 1, "corpus should span several windows");
    assert_eq!(report.ingest.summary_misses, report.ingest.nodes);
    assert_eq!(report.ingest.embedding_misses, report.ingest.nodes);
    assert_eq!(report.index_nodes, report.ingest.nodes);
    assert_eq!(chat.request_count(), report.ingest.nodes);
    assert!(config.paths.cache_file.exists());
    assert!(config.paths.index_db().exists());
    assert!(report.render().contains("index: built"));
}

#[tokio::test]
async fn rebuild_reuses_cache_and_loads_index() {
    let tmp = TempDir::new().unwrap();
    let config = config_with_corpus(tmp.path());

    let first_chat = Arc::new(ScriptedChat::new(Vec::new()));
    let first = run_build_with(&config, first_chat, Arc::new(HashEmbedder), &NoProgress)
        .await
        .unwrap();

    let second_chat = Arc::new(ScriptedChat::new(Vec::new()));
    let second = run_build_with(&config, second_chat.clone(), Arc::new(HashEmbedder), &NoProgress)
        .await
        .unwrap();

    assert_eq!(second.origin, IndexOrigin::Loaded);
    assert_eq!(second.ingest.nodes, first.ingest.nodes);
    assert!(second.ingest.cache_loaded);
    assert_eq!(second.ingest.summary_misses, 0);
    assert_eq!(second.ingest.embedding_misses, 0);
    assert_eq!(second_chat.request_count(), 0);
}

#[tokio::test]
async fn corrupt_snapshot_is_rebuilt() {
    let tmp = TempDir::new().unwrap();
    let config = config_with_corpus(tmp.path());
    let index_path = config.paths.index_db();
    std::fs::create_dir_all(index_path.parent().unwrap()).unwrap();
    std::fs::write(&index_path, b"definitely not sqlite").unwrap();

    assert!(VectorIndex::load(&index_path, DEFAULT_INDEX_ID).await.is_err());

    let chat = Arc::new(ScriptedChat::new(Vec::new()));
    let report = run_build_with(&config, chat, Arc::new(HashEmbedder), &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.origin, IndexOrigin::Built);

    let loaded = VectorIndex::load(&index_path, DEFAULT_INDEX_ID).await.unwrap();
    assert_eq!(loaded.len(), report.index_nodes);
    assert_eq!(loaded.embed_model(), "hash-embed");
}

#[tokio::test]
async fn wrong_index_id_is_a_typed_error() {
    let tmp = TempDir::new().unwrap();
    let config = config_with_corpus(tmp.path());
    let chat = Arc::new(ScriptedChat::new(Vec::new()));
    run_build_with(&config, chat, Arc::new(HashEmbedder), &NoProgress)
        .await
        .unwrap();

    let err = VectorIndex::load(&config.paths.index_db(), "summary")
        .await
        .unwrap_err();
    assert!(matches!(err, IndexLoadError::IdMismatch { .. }));
}

#[tokio::test]
async fn missing_sources_fail_the_build() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_with_corpus(tmp.path());
    config.paths.source_files = Vec::new();
    config.paths.source_dir = Some(tmp.path().join("nowhere"));

    let chat = Arc::new(ScriptedChat::new(Vec::new()));
    let result = run_build_with(&config, chat, Arc::new(HashEmbedder), &NoProgress).await;
    assert!(result.is_err());
    assert!(!config.paths.index_db().exists());
}

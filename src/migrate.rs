use sqlx::SqlitePool;

/// Create the index snapshot schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_store (
            index_id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            node_count INTEGER NOT NULL,
            embed_model TEXT NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            index_id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            summary TEXT,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (index_id) REFERENCES index_store(index_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_index_id ON nodes(index_id)")
        .execute(pool)
        .await?;

    Ok(())
}

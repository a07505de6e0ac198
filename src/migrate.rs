use anyhow::Result;
use sqlx::SqlitePool;

/// Create the storage schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Collection registry: one row per lazily-created collection, fixing
    // its embedding dimensionality.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only document rows. Duplicate doc_id rows are allowed; callers
    // use deterministic composite ids where duplication is unwanted.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Inverted index from association tag to document row.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_tags (
            collection TEXT NOT NULL,
            tag TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            seq INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_tags_collection_tag ON document_tags(collection, tag)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

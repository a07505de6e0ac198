//! SQLite-backed [`CollectionStore`] implementation.
//!
//! Maps each store operation onto the `collections` / `documents` /
//! `document_tags` schema. Vectors are stored as little-endian f32 BLOBs;
//! association tags are materialized into `document_tags` on every write so
//! graph lookups are an indexed join rather than a metadata scan.

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{meta_str_list, Document, SearchHit, META_ASSOCIATIONS};

use super::CollectionStore;

/// SQLite implementation of the [`CollectionStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Decode a document row, skipping rows whose metadata fails to parse.
fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Option<Document> {
    let doc_id: String = row.get("doc_id");
    let metadata_json: String = row.get("metadata_json");
    let metadata = match serde_json::from_str(&metadata_json) {
        Ok(value) => value,
        Err(e) => {
            warn!("skipping document '{}' with malformed metadata: {}", doc_id, e);
            return None;
        }
    };
    let blob: Vec<u8> = row.get("embedding");
    Some(Document {
        id: doc_id,
        text: row.get("text"),
        vector: blob_to_vec(&blob),
        metadata,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn upsert(&self, collection: &str, doc: Document) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_optional(&mut *tx)
            .await?;
        match dims {
            Some(dims) if dims as usize != doc.vector.len() => {
                bail!(
                    "dimension mismatch for collection '{}': expected {}, got {}",
                    collection,
                    dims,
                    doc.vector.len()
                );
            }
            Some(_) => {}
            None => {
                // Idempotent insert: a racing first-write to the same name
                // leaves a single registry row either way.
                sqlx::query(
                    r#"
                    INSERT INTO collections (name, dims, created_at) VALUES (?, ?, ?)
                    ON CONFLICT(name) DO NOTHING
                    "#,
                )
                .bind(collection)
                .bind(doc.vector.len() as i64)
                .bind(doc.created_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        let metadata_json = doc.metadata.to_string();
        let blob = vec_to_blob(&doc.vector);
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, doc_id, text, embedding, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(&doc.id)
        .bind(&doc.text)
        .bind(&blob)
        .bind(&metadata_json)
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await?;
        let seq = result.last_insert_rowid();

        for tag in meta_str_list(&doc.metadata, META_ASSOCIATIONS) {
            sqlx::query(
                "INSERT INTO document_tags (collection, tag, doc_id, seq) VALUES (?, ?, ?, ?)",
            )
            .bind(collection)
            .bind(&tag)
            .bind(&doc.id)
            .bind(seq)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id, text, embedding, metadata_json, created_at
            FROM documents
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter_map(decode_row)
            .map(|doc| SearchHit {
                score: cosine_similarity(query, &doc.vector),
                document: doc,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id, text, embedding, metadata_json, created_at
            FROM documents
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(decode_row).collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT doc_id, text, embedding, metadata_json, created_at
            FROM documents
            WHERE collection = ? AND doc_id = ?
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(decode_row))
    }

    async fn replace_all(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        if let Some(first) = docs.first() {
            let dims = first.vector.len();
            if docs.iter().any(|d| d.vector.len() != dims) {
                bail!(
                    "dimension mismatch in replacement batch for collection '{}'",
                    collection
                );
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_tags WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;

        if let Some(first) = docs.first() {
            sqlx::query(
                r#"
                INSERT INTO collections (name, dims, created_at) VALUES (?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET dims = excluded.dims
                "#,
            )
            .bind(collection)
            .bind(first.vector.len() as i64)
            .bind(first.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for doc in &docs {
            let metadata_json = doc.metadata.to_string();
            let blob = vec_to_blob(&doc.vector);
            let result = sqlx::query(
                r#"
                INSERT INTO documents (collection, doc_id, text, embedding, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection)
            .bind(&doc.id)
            .bind(&doc.text)
            .bind(&blob)
            .bind(&metadata_json)
            .bind(doc.created_at)
            .execute(&mut *tx)
            .await?;
            let seq = result.last_insert_rowid();

            for tag in meta_str_list(&doc.metadata, META_ASSOCIATIONS) {
                sqlx::query(
                    "INSERT INTO document_tags (collection, tag, doc_id, seq) VALUES (?, ?, ?, ?)",
                )
                .bind(collection)
                .bind(&tag)
                .bind(&doc.id)
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_association(
        &self,
        collection: &str,
        tags: &[String],
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        if tags.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tags.len()].join(", ");
        let sql = format!(
            r#"
            SELECT DISTINCT d.seq, d.doc_id, d.text, d.embedding, d.metadata_json, d.created_at
            FROM document_tags t
            JOIN documents d ON d.seq = t.seq
            WHERE t.collection = ? AND t.tag IN ({placeholders})
            ORDER BY d.seq ASC
            "#
        );
        let mut query = sqlx::query(&sql).bind(collection);
        for tag in tags {
            query = query.bind(tag);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut out = Vec::new();
        for row in &rows {
            let Some(doc) = decode_row(row) else {
                continue;
            };
            if exclude.contains(&doc.id) {
                continue;
            }
            out.push(doc);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}

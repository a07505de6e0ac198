//! Style-reference pool and cluster search.
//!
//! Style references are a flat pool of user-submitted exemplar texts,
//! searchable by topic/tone query. The cluster collection holds the derived
//! archetypes produced by the reindex job (see `cluster`); searching it
//! ranks centroids, returning style summaries instead of raw exemplars.

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::engine::MemoryEngine;
use crate::models::{Document, SearchHit, StyleCluster, META_SOURCE_TYPE};

/// Deterministic content-derived id, so re-ingesting the same sample text
/// produces the same id instead of an unbounded spread of fresh ones.
fn style_sample_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("style:{}", &hash[..16])
}

impl MemoryEngine {
    /// Ingest a batch of style exemplars in one embedding round trip.
    ///
    /// Blank entries are dropped. Provider failure drops the whole batch
    /// with a warning.
    pub async fn ingest_style_samples(&self, texts: &[String]) -> Result<()> {
        if texts.is_empty() {
            return Ok(());
        }
        let vectors = self.gateway.embed_batch(texts).await;
        if vectors.is_empty() {
            warn!(
                "dropping batch of {} style samples: embedding unavailable",
                texts.len()
            );
            return Ok(());
        }

        let created_at = Self::now();
        for (text, vector) in texts.iter().zip(vectors) {
            if vector.is_empty() {
                continue;
            }
            self.store
                .upsert(
                    &self.memory.style_references_collection,
                    Document {
                        id: style_sample_id(text),
                        text: text.clone(),
                        vector,
                        metadata: serde_json::json!({ META_SOURCE_TYPE: "style_reference" }),
                        created_at,
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Closest stylistic exemplars for a topic/tone query.
    pub async fn search_style_memory(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query_vec = self.gateway.embed(query).await;
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .search(&self.memory.style_references_collection, &query_vec, limit)
            .await
    }

    /// Closest style archetypes, ranked by centroid similarity.
    ///
    /// Cluster documents that fail to decode are skipped with a warning.
    pub async fn search_style_clusters(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StyleCluster>> {
        let query_vec = self.gateway.embed(query).await;
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .store
            .search(&self.memory.style_clusters_collection, &query_vec, limit)
            .await?;

        let mut clusters = Vec::new();
        for hit in hits {
            match StyleCluster::from_document(&hit.document) {
                Ok(cluster) => clusters.push(cluster),
                Err(e) => warn!("skipping undecodable style cluster: {}", e),
            }
        }
        Ok(clusters)
    }
}

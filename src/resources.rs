//! Scoped resource index over the general-purpose `resources` collection.
//!
//! Writes chunk long text before embedding; reads rank globally and then
//! post-filter by scope visibility and source type, so filtering never
//! reorders the results a caller is allowed to see.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::chunk::chunk_text;
use crate::engine::MemoryEngine;
use crate::models::{meta_str, Document, Scope, SearchHit, META_CHUNK_INDEX, META_SOURCE_TYPE};

/// Caller-supplied search filters.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilters {
    /// Allow-list on metadata `sourceType`. Empty means no type filtering.
    pub source_types: Vec<String>,
}

impl ResourceFilters {
    fn allows(&self, metadata: &Value) -> bool {
        if self.source_types.is_empty() {
            return true;
        }
        match meta_str(metadata, META_SOURCE_TYPE) {
            Some(source_type) => self.source_types.iter().any(|t| t == source_type),
            None => false,
        }
    }
}

impl MemoryEngine {
    /// Store a resource, chunking long text into multiple documents.
    ///
    /// A single chunk keeps the caller's id; multiple chunks get
    /// `"<id>:<chunkIndex>"` ids with chunk offsets merged into the
    /// metadata. When the embedding provider is unavailable the write is
    /// dropped with a warning — sparse memory is non-fatal to callers.
    pub async fn upsert_resource(&self, id: &str, text: &str, metadata: Value) -> Result<()> {
        let chunks = chunk_text(
            text,
            self.chunking.chunk_size,
            self.chunking.overlap,
            self.chunking.max_chunks,
        );
        if chunks.is_empty() {
            debug!("resource '{}' has no embeddable text, nothing stored", id);
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.gateway.embed_batch(&texts).await;
        if vectors.is_empty() {
            warn!("dropping resource '{}': embedding unavailable", id);
            return Ok(());
        }

        let created_at = Self::now();
        let single = chunks.len() == 1;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            if vector.is_empty() {
                continue;
            }
            let doc_id = if single {
                id.to_string()
            } else {
                format!("{}:{}", id, chunk.index)
            };
            let mut metadata = metadata.clone();
            if !single {
                if let Value::Object(map) = &mut metadata {
                    map.insert(META_CHUNK_INDEX.to_string(), chunk.index.into());
                    map.insert("start".to_string(), chunk.start.into());
                    map.insert("end".to_string(), chunk.end.into());
                }
            }
            self.store
                .upsert(
                    &self.memory.resources_collection,
                    Document {
                        id: doc_id,
                        text: chunk.text.clone(),
                        vector,
                        metadata,
                        created_at,
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Similarity search over resources visible to `scope`.
    ///
    /// Fetches a bounded candidate page, drops documents the scope may not
    /// see (and any failing the source-type allow-list), then truncates to
    /// `limit`. Filtering happens after ranking so the relative order of
    /// visible results is exactly the global ranking. A page emptied by
    /// filtering simply yields fewer results; there is no re-query.
    pub async fn search_resources(
        &self,
        query: &str,
        limit: usize,
        scope: &Scope,
        filters: Option<&ResourceFilters>,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.gateway.embed(query).await;
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self
            .store
            .search(
                &self.memory.resources_collection,
                &query_vec,
                limit * self.memory.candidate_factor,
            )
            .await?;

        let mut out = Vec::new();
        for hit in candidates {
            if !scope.permits(&hit.document.metadata) {
                continue;
            }
            if let Some(filters) = filters {
                if !filters.allows(&hit.document.metadata) {
                    continue;
                }
            }
            out.push(hit);
            if out.len() == limit {
                break;
            }
        }
        Ok(out)
    }

    /// The most recently stored row for a resource id, if any.
    pub async fn get_resource(&self, id: &str) -> Result<Option<Document>> {
        self.store.get(&self.memory.resources_collection, id).await
    }
}

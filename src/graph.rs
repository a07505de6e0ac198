//! Graph-associative retrieval over the resource collection.
//!
//! Two passes: a semantic pass ranked by the query vector, then a
//! "logical leap" pass that follows the association tags harvested from the
//! semantic results to documents the query vector alone would not surface.
//! Leap results are appended after the semantic ones and are never re-ranked
//! against the query — they are associatively relevant, not similar, and
//! stay distinguishable via their `search_type`.

use std::collections::HashSet;

use anyhow::Result;

use crate::engine::MemoryEngine;
use crate::models::{meta_str_list, GraphHit, SearchType, META_ASSOCIATIONS};

impl MemoryEngine {
    /// Semantic search plus a capped association-tag traversal.
    pub async fn search_graph_context(&self, query: &str, limit: usize) -> Result<Vec<GraphHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.gateway.embed(query).await;
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }

        let semantic = self
            .store
            .search(&self.memory.resources_collection, &query_vec, limit)
            .await?;

        // Union of association tags across the semantic results, first-seen
        // order preserved.
        let mut tags = Vec::new();
        let mut seen_tags = HashSet::new();
        let mut exclude = HashSet::new();
        for hit in &semantic {
            exclude.insert(hit.document.id.clone());
            for tag in meta_str_list(&hit.document.metadata, META_ASSOCIATIONS) {
                if seen_tags.insert(tag.clone()) {
                    tags.push(tag);
                }
            }
        }

        let mut results: Vec<GraphHit> = semantic
            .into_iter()
            .map(|hit| GraphHit {
                document: hit.document,
                score: hit.score,
                search_type: SearchType::Semantic,
            })
            .collect();

        if !tags.is_empty() {
            let leaps = self
                .store
                .find_by_association(
                    &self.memory.resources_collection,
                    &tags,
                    &exclude,
                    self.memory.leap_limit,
                )
                .await?;
            results.extend(leaps.into_iter().map(|document| GraphHit {
                document,
                score: 0.0,
                search_type: SearchType::LogicalLeap,
            }));
        }

        Ok(results)
    }
}

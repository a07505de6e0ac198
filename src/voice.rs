//! Per-persona voice memory.
//!
//! Each persona gets its own collection of historically successful outputs.
//! Unlike the resource index, voice search carries no scope filter: a
//! persona's voice is shared across everyone who uses that persona.

use anyhow::Result;
use serde_json::Value;
use tracing::warn;

use crate::engine::MemoryEngine;
use crate::models::{Document, SearchHit};

impl MemoryEngine {
    /// Remember one of a persona's outputs. Dropped with a warning when the
    /// embedding provider is unavailable.
    pub async fn upsert_to_voice_memory(
        &self,
        persona_id: &str,
        id: &str,
        text: &str,
        metadata: Value,
    ) -> Result<()> {
        let vector = self.gateway.embed(text).await;
        if vector.is_empty() {
            warn!(
                "dropping voice memory '{}' for persona '{}': embedding unavailable",
                id, persona_id
            );
            return Ok(());
        }
        self.store
            .upsert(
                &self.voice_collection(persona_id),
                Document {
                    id: id.to_string(),
                    text: text.to_string(),
                    vector,
                    metadata,
                    created_at: Self::now(),
                },
            )
            .await
    }

    /// Closest voice-memory entries for a persona.
    pub async fn search_voice_memory(
        &self,
        persona_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.gateway.embed(query).await;
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .search(&self.voice_collection(persona_id), &query_vec, limit)
            .await
    }
}

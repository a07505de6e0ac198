//! Engine facade wiring storage, embedding, and configuration together.
//!
//! [`MemoryEngine`] is the caller boundary of the whole subsystem: the
//! generation/prompting layer talks to it and to nothing below it. Each
//! operation group lives in its own module (`resources`, `voice`, `style`,
//! `cluster`, `graph`) as an `impl` block on this type.

use std::sync::Arc;

use anyhow::Result;

use crate::config::{ChunkingConfig, MemoryConfig};
use crate::embedding::EmbeddingGateway;
use crate::store::CollectionStore;

pub struct MemoryEngine {
    pub(crate) store: Arc<dyn CollectionStore>,
    pub(crate) gateway: EmbeddingGateway,
    pub(crate) memory: MemoryConfig,
    pub(crate) chunking: ChunkingConfig,
}

impl MemoryEngine {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        gateway: EmbeddingGateway,
        memory: MemoryConfig,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            memory,
            chunking,
        }
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &dyn CollectionStore {
        self.store.as_ref()
    }

    /// The voice-memory collection for a persona. One collection per
    /// persona: a persona's voice is a shared asset, not per end-user.
    pub(crate) fn voice_collection(&self, persona_id: &str) -> String {
        format!("{}{}", self.memory.voice_collection_prefix, persona_id)
    }

    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Document counts per collection, sorted by collection name.
    pub async fn stats(&self) -> Result<Vec<(String, usize)>> {
        let mut out = Vec::new();
        for name in self.store.collection_names().await? {
            let count = self.store.count(&name).await?;
            out.push((name, count));
        }
        Ok(out)
    }
}

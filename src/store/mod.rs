//! Storage abstraction for the memory engine.
//!
//! The [`CollectionStore`] trait defines the operations the retrieval
//! pipeline needs over named, lazily-created collections of documents,
//! enabling pluggable backends (SQLite, in-memory).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, SearchHit};

/// Abstract storage backend: named collections of embedded documents.
///
/// Collections are created lazily on first write; reads against a missing
/// collection return empty results rather than erroring, so "no memory yet"
/// is indistinguishable from "empty memory".
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](CollectionStore::upsert) | Append a document |
/// | [`search`](CollectionStore::search) | Cosine-ranked similarity search |
/// | [`scan`](CollectionStore::scan) | All documents in insertion order |
/// | [`get`](CollectionStore::get) | Latest row for an id |
/// | [`replace_all`](CollectionStore::replace_all) | Atomic wholesale replacement |
/// | [`find_by_association`](CollectionStore::find_by_association) | Tag-membership lookup |
/// | [`count`](CollectionStore::count) | Document count |
/// | [`collection_names`](CollectionStore::collection_names) | Registry listing |
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Append a document, creating the collection on first write.
    ///
    /// The first write fixes the collection's vector dimensionality;
    /// appending a vector of a different length is an error. Re-adding an
    /// existing id appends another row — there is no update-in-place.
    async fn upsert(&self, collection: &str, doc: Document) -> Result<()>;

    /// Top `limit` documents ranked by cosine similarity to `query`,
    /// descending, ties broken by insertion order. Mismatched or empty
    /// vectors rank as similarity zero.
    async fn search(&self, collection: &str, query: &[f32], limit: usize)
        -> Result<Vec<SearchHit>>;

    /// All documents in insertion order.
    async fn scan(&self, collection: &str) -> Result<Vec<Document>>;

    /// The most recently appended row for `id`, if any.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Atomically replace the collection's contents with `docs`.
    ///
    /// Readers observe either the previous set or the new set, never a mix.
    async fn replace_all(&self, collection: &str, docs: Vec<Document>) -> Result<()>;

    /// Documents whose `associations` metadata intersects `tags`, skipping
    /// ids in `exclude`, in insertion order, capped at `limit`.
    async fn find_by_association(
        &self,
        collection: &str,
        tags: &[String],
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Document>>;

    /// Number of documents in the collection (0 when missing).
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Names of all collections created so far.
    async fn collection_names(&self) -> Result<Vec<String>>;
}

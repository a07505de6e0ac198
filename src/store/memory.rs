//! In-memory [`CollectionStore`] implementation.
//!
//! Backs embedded and test deployments. Collections live in a `HashMap`
//! behind one `RwLock`; the lock also serializes racing first-writes so a
//! collection is never created twice. Vector search is brute-force cosine
//! similarity over the collection, and each collection maintains an inverted
//! index from association tag to document position for graph lookups.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{meta_str_list, Document, SearchHit, META_ASSOCIATIONS};

use super::CollectionStore;

struct StoredCollection {
    dims: usize,
    docs: Vec<Document>,
    tag_index: HashMap<String, Vec<usize>>,
}

impl StoredCollection {
    fn new(dims: usize) -> Self {
        Self {
            dims,
            docs: Vec::new(),
            tag_index: HashMap::new(),
        }
    }

    fn push(&mut self, doc: Document) {
        let pos = self.docs.len();
        for tag in meta_str_list(&doc.metadata, META_ASSOCIATIONS) {
            self.tag_index.entry(tag).or_default().push(pos);
        }
        self.docs.push(doc);
    }
}

/// In-memory store for embedded and test use.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn upsert(&self, collection: &str, doc: Document) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| StoredCollection::new(doc.vector.len()));
        if entry.dims != doc.vector.len() {
            bail!(
                "dimension mismatch for collection '{}': expected {}, got {}",
                collection,
                entry.dims,
                doc.vector.len()
            );
        }
        entry.push(doc);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().unwrap();
        let stored = match collections.get(collection) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };

        let mut hits: Vec<SearchHit> = stored
            .docs
            .iter()
            .map(|doc| SearchHit {
                score: cosine_similarity(query, &doc.vector),
                document: doc.clone(),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<Document>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .map(|s| s.docs.clone())
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|s| s.docs.iter().rev().find(|d| d.id == id).cloned()))
    }

    async fn replace_all(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        let dims = match docs.first() {
            Some(first) => {
                let dims = first.vector.len();
                if docs.iter().any(|d| d.vector.len() != dims) {
                    bail!(
                        "dimension mismatch in replacement batch for collection '{}'",
                        collection
                    );
                }
                Some(dims)
            }
            None => None,
        };

        let mut collections = self.collections.write().unwrap();
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| StoredCollection::new(dims.unwrap_or(0)));
        if let Some(dims) = dims {
            entry.dims = dims;
        }
        entry.docs.clear();
        entry.tag_index.clear();
        for doc in docs {
            entry.push(doc);
        }
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
        let collections = self.collections.read().unwrap();
        let stored = match collections.get(collection) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };

        // BTreeSet dedupes positions reached via multiple tags and yields
        // them in insertion order.
        let mut positions = BTreeSet::new();
        for tag in tags {
            if let Some(found) = stored.tag_index.get(tag) {
                positions.extend(found.iter().copied());
            }
        }

        let mut out = Vec::new();
        for pos in positions {
            let doc = &stored.docs[pos];
            if exclude.contains(&doc.id) {
                continue;
            }
            out.push(doc.clone());
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().unwrap();
        Ok(collections.get(collection).map(|s| s.docs.len()).unwrap_or(0))
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().unwrap();
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

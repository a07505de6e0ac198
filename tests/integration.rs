//! Engine-level integration tests over the in-memory store.
//!
//! A stub embedding backend maps registered texts to fixed vectors so
//! ranking is fully controlled; unregistered texts get a deterministic
//! fallback derived from their bytes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use muse_memory::config::{ChunkingConfig, MemoryConfig};
use muse_memory::embedding::{Embedder, EmbeddingGateway};
use muse_memory::engine::MemoryEngine;
use muse_memory::models::{Scope, SearchType};
use muse_memory::resources::ResourceFilters;
use muse_memory::store::memory::InMemoryStore;

const DIMS: usize = 3;

struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    fn new(entries: &[(&str, [f32; DIMS])]) -> Self {
        let vectors = entries
            .iter()
            .map(|(text, v)| (text.to_string(), v.to_vec()))
            .collect();
        Self { vectors }
    }

    fn fallback(text: &str) -> Vec<f32> {
        let bytes = text.as_bytes();
        let a = *bytes.first().unwrap_or(&1) as f32;
        let b = bytes.len() as f32;
        let c = bytes.iter().map(|&x| x as u32).sum::<u32>() % 97;
        vec![a, b, c as f32 + 1.0]
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| Self::fallback(t))
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("provider unreachable")
    }
}

fn engine_with(embedder: Box<dyn Embedder>) -> MemoryEngine {
    MemoryEngine::new(
        Arc::new(InMemoryStore::new()),
        EmbeddingGateway::new(embedder),
        MemoryConfig::default(),
        ChunkingConfig::default(),
    )
}

fn scope(author: &str, team: Option<&str>) -> Scope {
    Scope::new(author, team.map(str::to_string))
}

#[tokio::test]
async fn test_empty_deployment_searches_return_empty() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[])));
    let hits = engine
        .search_resources("anything", 10, &scope("alice", None), None)
        .await
        .unwrap();
    assert!(hits.is_empty());

    assert!(engine
        .search_voice_memory("persona-1", "anything", 10)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .search_style_memory("anything", 10)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .search_style_clusters("anything", 10)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .search_graph_context("anything", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_scope_visibility_filters_results() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("the query", [1.0, 0.0, 0.0]),
        ("authored note", [0.95, 0.05, 0.0]),
        ("team note", [0.9, 0.1, 0.0]),
        ("public note", [0.85, 0.15, 0.0]),
    ])));

    engine
        .upsert_resource("doc-author", "authored note", json!({ "authorId": "alice" }))
        .await
        .unwrap();
    engine
        .upsert_resource("doc-team", "team note", json!({ "teamId": "team-1" }))
        .await
        .unwrap();
    engine
        .upsert_resource(
            "doc-public",
            "public note",
            json!({ "authorId": "bob", "visibility": "public" }),
        )
        .await
        .unwrap();

    // alice (no team): her own doc plus the public one, in ranking order.
    let hits = engine
        .search_resources("the query", 10, &scope("alice", None), None)
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
    assert_eq!(ids, vec!["doc-author", "doc-public"]);

    // carol on team-1: the team doc plus the public one.
    let hits = engine
        .search_resources("the query", 10, &scope("carol", Some("team-1")), None)
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
    assert_eq!(ids, vec!["doc-team", "doc-public"]);
}

#[tokio::test]
async fn test_seed_documents_visible_to_everyone() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("the query", [1.0, 0.0, 0.0]),
        ("seed knowledge", [0.9, 0.1, 0.0]),
    ])));
    engine
        .upsert_resource("doc-seed", "seed knowledge", json!({ "sourceType": "knowledge" }))
        .await
        .unwrap();

    let hits = engine
        .search_resources("the query", 10, &scope("anyone", None), None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "doc-seed");
}

#[tokio::test]
async fn test_source_type_allow_list() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("the query", [1.0, 0.0, 0.0]),
        ("a memory", [0.95, 0.0, 0.0]),
        ("some knowledge", [0.9, 0.0, 0.0]),
    ])));
    engine
        .upsert_resource(
            "doc-memory",
            "a memory",
            json!({ "authorId": "alice", "sourceType": "memory" }),
        )
        .await
        .unwrap();
    engine
        .upsert_resource(
            "doc-knowledge",
            "some knowledge",
            json!({ "authorId": "alice", "sourceType": "knowledge" }),
        )
        .await
        .unwrap();

    let filters = ResourceFilters {
        source_types: vec!["knowledge".to_string()],
    };
    let hits = engine
        .search_resources("the query", 10, &scope("alice", None), Some(&filters))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "doc-knowledge");
}

#[tokio::test]
async fn test_filtering_preserves_ranking_order() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("the query", [1.0, 0.0, 0.0]),
        ("first", [0.99, 0.0, 0.0]),
        ("hidden", [0.97, 0.0, 0.0]),
        ("second", [0.95, 0.0, 0.0]),
        ("third", [0.9, 0.0, 0.0]),
    ])));
    engine
        .upsert_resource("r1", "first", json!({ "authorId": "alice" }))
        .await
        .unwrap();
    engine
        .upsert_resource("r2", "hidden", json!({ "authorId": "bob" }))
        .await
        .unwrap();
    engine
        .upsert_resource("r3", "second", json!({ "authorId": "alice" }))
        .await
        .unwrap();
    engine
        .upsert_resource("r4", "third", json!({ "authorId": "alice" }))
        .await
        .unwrap();

    let hits = engine
        .search_resources("the query", 2, &scope("alice", None), None)
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
    // The invisible r2 drops out without disturbing the survivors' order.
    assert_eq!(ids, vec!["r1", "r3"]);
}

#[tokio::test]
async fn test_long_resource_is_chunked_with_composite_ids() {
    let engine = MemoryEngine::new(
        Arc::new(InMemoryStore::new()),
        EmbeddingGateway::new(Box::new(StubEmbedder::new(&[]))),
        MemoryConfig::default(),
        ChunkingConfig {
            chunk_size: 40,
            overlap: 5,
            max_chunks: 8,
        },
    );

    let text = "First sentence here. Second sentence follows after. Third sentence closes it.";
    engine
        .upsert_resource("res:alice:1", text, json!({ "authorId": "alice" }))
        .await
        .unwrap();

    let docs = engine.store().scan("resources").await.unwrap();
    assert!(docs.len() > 1);
    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(doc.id, format!("res:alice:1:{}", i));
        assert_eq!(doc.metadata["chunkIndex"], json!(i));
        assert_eq!(doc.metadata["authorId"], json!("alice"));
    }
}

#[tokio::test]
async fn test_short_resource_keeps_caller_id() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[])));
    engine
        .upsert_resource("res:alice:2", "short note", json!({ "authorId": "alice" }))
        .await
        .unwrap();
    let docs = engine.store().scan("resources").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "res:alice:2");
    assert!(docs[0].metadata.get("chunkIndex").is_none());
}

#[tokio::test]
async fn test_degraded_provider_drops_writes_and_searches() {
    let engine = engine_with(Box::new(FailingEmbedder));

    // Writes silently no-op rather than erroring.
    engine
        .upsert_resource("r1", "some text", json!({}))
        .await
        .unwrap();
    engine
        .upsert_to_voice_memory("p1", "v1", "voice text", json!({}))
        .await
        .unwrap();
    engine
        .ingest_style_samples(&["sample".to_string()])
        .await
        .unwrap();
    assert_eq!(engine.store().count("resources").await.unwrap(), 0);
    assert_eq!(engine.store().count("style_references").await.unwrap(), 0);

    // Searches degrade to empty results.
    assert!(engine
        .search_resources("q", 5, &scope("a", None), None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_duplicate_id_appends_row() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[])));
    engine
        .upsert_resource("dup", "first version", json!({}))
        .await
        .unwrap();
    engine
        .upsert_resource("dup", "second version", json!({}))
        .await
        .unwrap();

    assert_eq!(engine.store().count("resources").await.unwrap(), 2);
    // get returns the most recent row.
    let doc = engine.get_resource("dup").await.unwrap().unwrap();
    assert_eq!(doc.text, "second version");
}

#[tokio::test]
async fn test_voice_memory_is_per_persona_and_unscoped() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("the query", [1.0, 0.0, 0.0]),
        ("pirate voice", [0.9, 0.1, 0.0]),
        ("formal voice", [0.8, 0.2, 0.0]),
    ])));
    engine
        .upsert_to_voice_memory("pirate", "v1", "pirate voice", json!({ "authorId": "alice" }))
        .await
        .unwrap();
    engine
        .upsert_to_voice_memory("formal", "v2", "formal voice", json!({}))
        .await
        .unwrap();

    let hits = engine
        .search_voice_memory("pirate", "the query", 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "v1");

    let hits = engine
        .search_voice_memory("formal", "the query", 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, "v2");
}

#[tokio::test]
async fn test_style_lifecycle_reindex_and_cluster_search() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[])));

    let first: Vec<String> = ["alpha style", "bravo style", "charlie style"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    engine.ingest_style_samples(&first).await.unwrap();

    // Below the minimum sample count the reindex is a silent no-op.
    engine.reindex_style_clusters().await.unwrap();
    assert_eq!(engine.store().count("style_clusters").await.unwrap(), 0);

    let more: Vec<String> = ["delta style", "echo style"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    engine.ingest_style_samples(&more).await.unwrap();
    assert_eq!(engine.store().count("style_references").await.unwrap(), 5);

    engine.reindex_style_clusters().await.unwrap();
    let clusters = engine.store().scan("style_clusters").await.unwrap();
    assert!(!clusters.is_empty());

    let ingested: Vec<String> = engine
        .store()
        .scan("style_references")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();

    let found = engine
        .search_style_clusters("alpha style", 10)
        .await
        .unwrap();
    assert!(!found.is_empty());
    let mut traced = 0;
    for cluster in &found {
        assert!(!cluster.sample_ids.is_empty());
        for id in &cluster.sample_ids {
            assert!(ingested.contains(id), "unknown sample id {}", id);
        }
        traced += cluster.sample_ids.len();
    }
    assert_eq!(traced, 5);
}

#[tokio::test]
async fn test_reindex_replaces_previous_cluster_set() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[])));
    let samples: Vec<String> = ["one", "two", "three", "four", "five"]
        .iter()
        .map(|s| format!("{} sample text", s))
        .collect();
    engine.ingest_style_samples(&samples).await.unwrap();

    engine.reindex_style_clusters().await.unwrap();
    let first = engine.store().scan("style_clusters").await.unwrap();
    engine.reindex_style_clusters().await.unwrap();
    let second = engine.store().scan("style_clusters").await.unwrap();

    // Idempotent: the second run replaces the set rather than appending.
    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn test_graph_context_tags_semantic_and_leap() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("zebra research", [1.0, 0.0, 0.0]),
        ("zebra facts", [0.95, 0.05, 0.0]),
        ("lion facts", [0.0, 1.0, 0.0]),
        ("rock facts", [0.0, 0.9, 0.1]),
    ])));

    engine
        .upsert_resource(
            "doc-zebra",
            "zebra facts",
            json!({ "associations": ["topic-z"] }),
        )
        .await
        .unwrap();
    engine
        .upsert_resource(
            "doc-lion",
            "lion facts",
            json!({ "associations": ["topic-z"] }),
        )
        .await
        .unwrap();
    engine
        .upsert_resource("doc-rock", "rock facts", json!({}))
        .await
        .unwrap();

    let hits = engine.search_graph_context("zebra research", 1).await.unwrap();
    assert_eq!(hits.len(), 2);

    assert_eq!(hits[0].document.id, "doc-zebra");
    assert_eq!(hits[0].search_type, SearchType::Semantic);
    assert!(hits[0].score > 0.9);

    // doc-lion shares the tag but not the vector neighborhood.
    assert_eq!(hits[1].document.id, "doc-lion");
    assert_eq!(hits[1].search_type, SearchType::LogicalLeap);
    assert_eq!(hits[1].score, 0.0);
}

#[tokio::test]
async fn test_graph_context_without_tags_is_semantic_only() {
    let engine = engine_with(Box::new(StubEmbedder::new(&[
        ("the query", [1.0, 0.0, 0.0]),
        ("plain note", [0.9, 0.0, 0.0]),
    ])));
    engine
        .upsert_resource("doc-plain", "plain note", json!({}))
        .await
        .unwrap();

    let hits = engine.search_graph_context("the query", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].search_type, SearchType::Semantic);
}

#[tokio::test]
async fn test_graph_leap_cap() {
    let mut entries = vec![
        ("hub query", [1.0, 0.0, 0.0]),
        ("hub note", [0.95, 0.0, 0.0]),
    ];
    let texts: Vec<String> = (0..6).map(|i| format!("spoke note {}", i)).collect();
    for text in &texts {
        entries.push((text.as_str(), [0.0, 1.0, 0.0]));
    }
    let engine = engine_with(Box::new(StubEmbedder::new(&entries)));

    engine
        .upsert_resource("hub", "hub note", json!({ "associations": ["shared"] }))
        .await
        .unwrap();
    for (i, text) in texts.iter().enumerate() {
        engine
            .upsert_resource(
                &format!("spoke-{}", i),
                text,
                json!({ "associations": ["shared"] }),
            )
            .await
            .unwrap();
    }

    let hits = engine.search_graph_context("hub query", 1).await.unwrap();
    let leaps = hits
        .iter()
        .filter(|h| h.search_type == SearchType::LogicalLeap)
        .count();
    assert_eq!(leaps, 3);
}

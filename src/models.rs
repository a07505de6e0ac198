//! Core data models used throughout the memory engine.
//!
//! These types represent the documents, scopes, and search results that flow
//! through the storage and retrieval pipeline. Metadata is a schemaless JSON
//! object: consumers read the keys they care about and preserve the rest.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

/// Metadata key for the content category ("memory", "knowledge", ...).
pub const META_SOURCE_TYPE: &str = "sourceType";
/// Metadata key for the owning author.
pub const META_AUTHOR_ID: &str = "authorId";
/// Metadata key for the owning team.
pub const META_TEAM_ID: &str = "teamId";
/// Metadata key for the visibility override ("public" / "private").
pub const META_VISIBILITY: &str = "visibility";
/// Metadata key for association tags (array of strings).
pub const META_ASSOCIATIONS: &str = "associations";
/// Metadata key for a chunk's position within its source text.
pub const META_CHUNK_INDEX: &str = "chunkIndex";

/// The atomic stored unit: a text fragment plus its embedding vector.
///
/// `id` is caller-supplied and often composite
/// (`"<namespace>:<ownerId>:<localId>[:<chunkIndex>]"`). Re-adding an id
/// appends another row rather than updating in place.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    /// The literal content that was embedded. Never re-embedded implicitly.
    pub text: String,
    pub vector: Vec<f32>,
    /// Schemaless JSON object. Unknown keys are preserved and ignored.
    pub metadata: Value,
    /// Insertion timestamp, unix seconds.
    pub created_at: i64,
}

/// A search result: a document plus its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f32,
}

/// How a graph-context result was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchType {
    /// Ranked by vector similarity against the query.
    Semantic,
    /// Reached through a shared association tag, not similarity.
    LogicalLeap,
}

/// A graph-context result. `logical-leap` hits carry a zero score: they are
/// included for associative relevance and are not ranked against the query.
#[derive(Debug, Clone, Serialize)]
pub struct GraphHit {
    pub document: Document,
    pub score: f32,
    pub search_type: SearchType,
}

/// The visibility context of a request.
#[derive(Debug, Clone)]
pub struct Scope {
    pub author_id: String,
    pub team_id: Option<String>,
}

impl Scope {
    pub fn new(author_id: impl Into<String>, team_id: Option<String>) -> Self {
        Self {
            author_id: author_id.into(),
            team_id,
        }
    }

    /// Whether a document with the given metadata is visible to this scope.
    ///
    /// Visible when the document's `authorId` matches, its `teamId` matches
    /// the scope's team (when the scope has one), it is marked `public`, or
    /// it carries neither `authorId` nor `teamId` (seed knowledge).
    pub fn permits(&self, metadata: &Value) -> bool {
        let author = meta_str(metadata, META_AUTHOR_ID);
        let team = meta_str(metadata, META_TEAM_ID);

        if author.is_none() && team.is_none() {
            return true;
        }
        if meta_str(metadata, META_VISIBILITY) == Some("public") {
            return true;
        }
        if author == Some(self.author_id.as_str()) {
            return true;
        }
        match (&self.team_id, team) {
            (Some(scope_team), Some(doc_team)) => scope_team == doc_team,
            _ => false,
        }
    }
}

/// A derived style archetype: the centroid of a group of style references.
///
/// Created only by the clustering job and replaced wholesale on each reindex.
/// `sample_ids` traces the cluster back to its raw exemplars.
#[derive(Debug, Clone, Serialize)]
pub struct StyleCluster {
    pub id: String,
    pub label: String,
    pub centroid: Vec<f32>,
    pub sample_ids: Vec<String>,
    pub count: usize,
}

impl StyleCluster {
    /// Encode this cluster as a storable [`Document`].
    pub fn into_document(self, created_at: i64) -> Document {
        let metadata = serde_json::json!({
            META_SOURCE_TYPE: "style_cluster",
            "label": self.label,
            "sampleIds": self.sample_ids,
            "count": self.count,
        });
        Document {
            id: self.id,
            text: self.label,
            vector: self.centroid,
            metadata,
            created_at,
        }
    }

    /// Decode a cluster from its stored form.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let label = match meta_str(&doc.metadata, "label") {
            Some(l) => l.to_string(),
            None => bail!("cluster document {} has no label", doc.id),
        };
        let sample_ids = meta_str_list(&doc.metadata, "sampleIds");
        if sample_ids.is_empty() {
            bail!("cluster document {} has no sampleIds", doc.id);
        }
        let count = doc
            .metadata
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(sample_ids.len() as u64) as usize;
        Ok(Self {
            id: doc.id.clone(),
            label,
            centroid: doc.vector.clone(),
            sample_ids,
            count,
        })
    }
}

/// Read a string-valued metadata key.
pub fn meta_str<'a>(metadata: &'a Value, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

/// Read a string-array metadata key. Non-string entries are dropped.
pub fn meta_str_list(metadata: &Value, key: &str) -> Vec<String> {
    metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_author_match() {
        let scope = Scope::new("alice", None);
        assert!(scope.permits(&json!({ "authorId": "alice" })));
        assert!(!scope.permits(&json!({ "authorId": "bob" })));
    }

    #[test]
    fn test_scope_team_match() {
        let scope = Scope::new("bob", Some("team-1".to_string()));
        assert!(scope.permits(&json!({ "teamId": "team-1" })));
        assert!(!scope.permits(&json!({ "teamId": "team-2" })));

        // Without a team in scope, team-owned documents stay hidden.
        let solo = Scope::new("bob", None);
        assert!(!solo.permits(&json!({ "teamId": "team-1" })));
    }

    #[test]
    fn test_scope_public_visibility() {
        let scope = Scope::new("carol", None);
        assert!(scope.permits(&json!({ "authorId": "bob", "visibility": "public" })));
        assert!(!scope.permits(&json!({ "authorId": "bob", "visibility": "private" })));
    }

    #[test]
    fn test_scope_seed_documents_globally_visible() {
        let scope = Scope::new("dave", None);
        assert!(scope.permits(&json!({ "sourceType": "knowledge" })));
        assert!(scope.permits(&json!({})));
    }

    #[test]
    fn test_style_cluster_roundtrip() {
        let cluster = StyleCluster {
            id: "style_cluster_0".to_string(),
            label: "Group 1: punchy openers".to_string(),
            centroid: vec![0.1, 0.2, 0.3],
            sample_ids: vec!["style:aa".to_string(), "style:bb".to_string()],
            count: 2,
        };
        let doc = cluster.clone().into_document(1_700_000_000);
        let restored = StyleCluster::from_document(&doc).unwrap();
        assert_eq!(restored.label, cluster.label);
        assert_eq!(restored.centroid, cluster.centroid);
        assert_eq!(restored.sample_ids, cluster.sample_ids);
        assert_eq!(restored.count, 2);
    }

    #[test]
    fn test_style_cluster_rejects_unlabeled() {
        let doc = Document {
            id: "x".to_string(),
            text: String::new(),
            vector: vec![1.0],
            metadata: json!({}),
            created_at: 0,
        };
        assert!(StyleCluster::from_document(&doc).is_err());
    }

    #[test]
    fn test_meta_str_list_drops_non_strings() {
        let meta = json!({ "associations": ["a", 1, "b", null] });
        assert_eq!(meta_str_list(&meta, "associations"), vec!["a", "b"]);
    }
}

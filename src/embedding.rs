//! Embedding gateway and provider backends.
//!
//! The [`EmbeddingGateway`] wraps an [`Embedder`] backend and owns the
//! degradation contract: blank input or any provider failure yields an empty
//! vector (single path) or an empty batch (batch path), with a logged
//! warning. Callers treat the empty vector as "skip this write/search" —
//! never as a zero vector, which would corrupt similarity geometry.
//!
//! Backends:
//! - **[`DisabledEmbedder`]** — always errors; the out-of-the-box default.
//! - **[`OpenAiEmbedder`]** — `POST /v1/embeddings`, requires `OPENAI_API_KEY`.
//! - **[`OllamaEmbedder`]** — `POST /api/embed` on a local Ollama instance.
//!
//! # Retry Strategy
//!
//! The HTTP backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;

/// A backend that maps text to fixed-length vectors.
///
/// Implementations may fail; the [`EmbeddingGateway`] turns every failure
/// into the empty-vector sentinel.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// The embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Wraps an [`Embedder`] with the engine's degradation contract.
pub struct EmbeddingGateway {
    embedder: Box<dyn Embedder>,
}

impl EmbeddingGateway {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Build a gateway from configuration. See [`create_embedder`].
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self::new(create_embedder(config)?))
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dims(&self) -> usize {
        self.embedder.dims()
    }

    /// Embed a single text.
    ///
    /// Blank input returns an empty vector without touching the provider.
    /// Provider failure degrades to an empty vector with a warning.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let batch = [text.to_string()];
        match self.embedder.embed_batch(&batch).await {
            Ok(vecs) if vecs.len() == 1 => vecs.into_iter().next().unwrap_or_default(),
            Ok(vecs) => {
                warn!(
                    "embedding provider returned {} vectors for 1 input, degrading to empty",
                    vecs.len()
                );
                Vec::new()
            }
            Err(e) => {
                warn!("embedding failed, degrading to empty vector: {e:#}");
                Vec::new()
            }
        }
    }

    /// Embed a batch of texts, preserving input order.
    ///
    /// Blank entries map to empty vectors in place and never reach the
    /// provider. Any provider failure degrades the whole batch to an empty
    /// outer array — there is no partial-success contract.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let mut slots = Vec::new();
        let mut non_blank = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            if !text.trim().is_empty() {
                slots.push(i);
                non_blank.push(text.clone());
            }
        }
        if non_blank.is_empty() {
            return vec![Vec::new(); texts.len()];
        }

        match self.embedder.embed_batch(&non_blank).await {
            Ok(vecs) if vecs.len() == non_blank.len() => {
                let mut out = vec![Vec::new(); texts.len()];
                for (slot, vec) in slots.into_iter().zip(vecs) {
                    out[slot] = vec;
                }
                out
            }
            Ok(vecs) => {
                warn!(
                    "embedding provider returned {} vectors for {} inputs, dropping batch",
                    vecs.len(),
                    non_blank.len()
                );
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "embedding batch of {} failed, dropping batch: {e:#}",
                    non_blank.len()
                );
                Vec::new()
            }
        }
    }
}

/// Create the appropriate [`Embedder`] backend based on configuration.
///
/// | Config value | Backend |
/// |--------------|---------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"`   | [`OpenAiEmbedder`] |
/// | `"ollama"`   | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

/// A no-op backend that always errors, which the gateway degrades to empty
/// vectors. Used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// Backend for the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = post_json_with_backoff(
                &self.client,
                "https://api.openai.com/v1/embeddings",
                Some(&self.api_key),
                &body,
                self.max_retries,
                "OpenAI",
            )
            .await?;

            let data = json
                .get("data")
                .and_then(|d| d.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

            for item in data {
                let embedding = item
                    .get("embedding")
                    .and_then(|e| e.as_array())
                    .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
                let vec: Vec<f32> = embedding
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect();
                embeddings.push(vec);
            }
        }
        Ok(embeddings)
    }
}

// ============ Ollama ============

/// Backend for a local Ollama instance's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut result = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = post_json_with_backoff(
                &self.client,
                &format!("{}/api/embed", self.url),
                None,
                &body,
                self.max_retries,
                "Ollama",
            )
            .await?;

            let embeddings = json
                .get("embeddings")
                .and_then(|e| e.as_array())
                .ok_or_else(|| {
                    anyhow::anyhow!("Invalid Ollama response: missing embeddings array")
                })?;

            for embedding in embeddings {
                let vec: Vec<f32> = embedding
                    .as_array()
                    .ok_or_else(|| {
                        anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
                    })?
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect();
                result.push(vec);
            }
        }
        Ok(result)
    }
}

/// POST a JSON body with retry/backoff, returning the parsed response body.
///
/// Retries 429, 5xx, and network errors; other client errors fail
/// immediately.
async fn post_json_with_backoff(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    provider: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut req = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }
                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        provider,
                        status,
                        body_text
                    ));
                    continue;
                }
                bail!("{} API error {}: {}", provider, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} connection error: {}", provider, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", provider)))
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths — mismatches rank as maximally dissimilar
/// instead of erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dims];
                    v[0] = t.len() as f32;
                    v
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
            4
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("provider unreachable")
        }
    }

    #[tokio::test]
    async fn test_blank_input_short_circuits() {
        let gateway = EmbeddingGateway::new(Box::new(FailingEmbedder));
        // A failing provider is never consulted for blank input.
        assert!(gateway.embed("   ").await.is_empty());
        assert!(gateway.embed("").await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty() {
        let gateway = EmbeddingGateway::new(Box::new(FailingEmbedder));
        assert!(gateway.embed("hello").await.is_empty());
        let batch = gateway
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_blanks() {
        let gateway = EmbeddingGateway::new(Box::new(StubEmbedder { dims: 3 }));
        let texts = vec![
            "one".to_string(),
            "   ".to_string(),
            "three33".to_string(),
        ];
        let batch = gateway.embed_batch(&texts).await;
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0][0], 3.0);
        assert!(batch[1].is_empty());
        assert_eq!(batch[2][0], 7.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_degrades() {
        let gateway = EmbeddingGateway::new(Box::new(DisabledEmbedder));
        assert!(gateway.embed("anything").await.is_empty());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![0.5f32, -1.25, 2.0, 0.0, -0.003];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.3, 0.5, 0.7];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![2.0, -1.0];
        let b = vec![-2.0, 1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}

//! Style-cluster reindexing job.
//!
//! Recomputes archetype centroids over the style-reference pool with
//! k-means on cosine similarity. Seeding is greedy farthest-point rather
//! than randomized, so a reindex over the same pool always produces the
//! same clusters.

use anyhow::Result;
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::engine::MemoryEngine;
use crate::models::StyleCluster;

const MAX_ITERATIONS: usize = 50;

impl MemoryEngine {
    /// Recompute style archetypes from the current reference pool.
    ///
    /// A silent no-op below the configured minimum sample count — clustering
    /// a handful of points is meaningless. The new cluster set lands in a
    /// single atomic write: readers observe either the previous set or the
    /// new one, and an aborted run leaves the previous set intact.
    pub async fn reindex_style_clusters(&self) -> Result<()> {
        let samples = self
            .store
            .scan(&self.memory.style_references_collection)
            .await?;
        if samples.len() < self.memory.min_cluster_samples {
            debug!(
                "skipping style reindex: {} samples, need {}",
                samples.len(),
                self.memory.min_cluster_samples
            );
            return Ok(());
        }

        let vectors: Vec<&[f32]> = samples.iter().map(|d| d.vector.as_slice()).collect();
        let k = cluster_count(samples.len(), self.memory.max_clusters);
        let (centroids, assignments) = kmeans(&vectors, k);

        let created_at = Self::now();
        let mut docs = Vec::new();
        for (ci, centroid) in centroids.into_iter().enumerate() {
            let members: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|&(_, a)| *a == ci)
                .map(|(i, _)| i)
                .collect();
            if members.is_empty() {
                continue;
            }

            // Label each archetype after its most central exemplar.
            let representative = members
                .iter()
                .copied()
                .max_by(|&x, &y| {
                    cosine_similarity(&centroid, vectors[x])
                        .partial_cmp(&cosine_similarity(&centroid, vectors[y]))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(members[0]);
            let ordinal = docs.len() + 1;
            let label = format!(
                "Style group {}: {}",
                ordinal,
                snippet(&samples[representative].text)
            );
            let sample_ids: Vec<String> = members.iter().map(|&i| samples[i].id.clone()).collect();
            let count = sample_ids.len();
            let cluster = StyleCluster {
                id: format!("style_cluster_{}", ordinal - 1),
                label,
                centroid,
                sample_ids,
                count,
            };
            docs.push(cluster.into_document(created_at));
        }

        self.store
            .replace_all(&self.memory.style_clusters_collection, docs)
            .await
    }
}

/// Cluster count grows with the square root of the sample count, within
/// `[1, max_clusters]`.
fn cluster_count(n: usize, max_clusters: usize) -> usize {
    ((n as f64).sqrt() as usize).clamp(1, max_clusters.max(1)).min(n)
}

/// K-means over unit-normalized vectors with cosine similarity.
///
/// Returns `(centroids, assignments)`. Deterministic for a fixed input
/// order: seeding is farthest-point from the first vector, and argmax ties
/// go to the lowest centroid index.
fn kmeans(vectors: &[&[f32]], k: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
    let k = k.clamp(1, vectors.len());
    let mut centroids = seed_centroids(vectors, k);
    let mut assignments = vec![0usize; vectors.len()];

    for _ in 0..MAX_ITERATIONS {
        let new_assignments: Vec<usize> = vectors
            .iter()
            .map(|v| nearest_centroid(v, &centroids))
            .collect();
        let converged = new_assignments == assignments;
        assignments = new_assignments;
        if converged {
            break;
        }

        let dims = vectors[0].len();
        let mut sums = vec![vec![0.0f32; dims]; centroids.len()];
        let mut sizes = vec![0usize; centroids.len()];
        for (vector, &ci) in vectors.iter().zip(assignments.iter()) {
            for (acc, &x) in sums[ci].iter_mut().zip(vector.iter()) {
                *acc += x;
            }
            sizes[ci] += 1;
        }
        for (ci, (sum, &size)) in sums.iter_mut().zip(sizes.iter()).enumerate() {
            if size == 0 {
                // Empty cluster keeps its previous centroid.
                continue;
            }
            for x in sum.iter_mut() {
                *x /= size as f32;
            }
            normalize(sum);
            centroids[ci] = sum.clone();
        }
    }

    (centroids, assignments)
}

/// Greedy farthest-point seeding: start from the first vector, then
/// repeatedly add the vector farthest (in cosine distance) from every
/// centroid chosen so far. Stops early if all remaining points coincide
/// with an existing centroid.
fn seed_centroids(vectors: &[&[f32]], k: usize) -> Vec<Vec<f32>> {
    let mut centroids = vec![normalized(vectors[0])];
    while centroids.len() < k {
        let mut best_idx = 0;
        let mut best_dist = f32::NEG_INFINITY;
        for (i, v) in vectors.iter().enumerate() {
            let nearest = centroids
                .iter()
                .map(|c| cosine_similarity(v, c))
                .fold(f32::NEG_INFINITY, f32::max);
            let dist = 1.0 - nearest;
            if dist > best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }
        if best_dist <= f32::EPSILON {
            break;
        }
        centroids.push(normalized(vectors[best_idx]));
    }
    centroids
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_sim = f32::NEG_INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let sim = cosine_similarity(vector, centroid);
        if sim > best_sim {
            best_sim = sim;
            best = i;
        }
    }
    best
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut v = vector.to_vec();
    normalize(&mut v);
    v
}

/// First line of a sample, capped for use inside a cluster label.
fn snippet(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    first_line.chars().take(48).collect::<String>().trim_end().to_string()
}

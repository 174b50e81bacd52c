//! Identity grouping over appearance embeddings.
//!
//! Greedy single-seed similarity clustering: each unvisited item opens a
//! group and claims every later unvisited item whose similarity *to the
//! seed* strictly exceeds the threshold. Membership is never judged
//! against other members, so two items below threshold with each other
//! can share a group through a common seed, and an item similar only to
//! an already-claimed member starts its own group. This matches the
//! deployed behavior exactly and is a compatibility contract, not an
//! approximation to be corrected.

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;

use crate::embedder::EmbeddingExtractor;
use crate::types::{BoundingBox, Embedding};

/// Default seed-similarity threshold for declaring two crops the same person.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.80;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("embedding length {got} disagrees with batch length {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// One historical person detection: the full source image plus the
/// detection's bounding box within it.
#[derive(Clone)]
pub struct PersonDetectionRecord {
    pub image: Arc<RgbImage>,
    pub bbox: BoundingBox,
}

/// Crops believed to depict the same person, in discovery order.
#[derive(Debug)]
pub struct IdentityGroup {
    pub crops: Vec<RgbImage>,
}

impl IdentityGroup {
    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }
}

/// Partitions a batch of person detections into identity groups.
pub struct IdentityClusterer {
    threshold: f32,
}

impl Default for IdentityClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl IdentityClusterer {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Run one clustering pass over `records`, in order.
    ///
    /// Records whose crop is unusable or whose extraction fails are
    /// dropped from the batch (logged, never fatal). Embeddings of
    /// inconsistent length are a configuration defect and abort the run.
    pub fn group(
        &self,
        extractor: &mut dyn EmbeddingExtractor,
        records: &[PersonDetectionRecord],
    ) -> Result<Vec<IdentityGroup>, ClusterError> {
        let mut embeddings: Vec<Embedding> = Vec::new();
        let mut crops: Vec<Option<RgbImage>> = Vec::new();

        for record in records {
            match extractor.extract(&record.image, &record.bbox) {
                Ok(Some((embedding, crop))) => {
                    embeddings.push(embedding);
                    crops.push(Some(crop));
                }
                Ok(None) => {
                    tracing::debug!(bbox = %record.bbox.to_csv(), "record unusable; dropped from clustering");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "embedding extraction failed; record dropped");
                }
            }
        }

        if embeddings.is_empty() {
            return Ok(Vec::new());
        }

        let expected = embeddings[0].len();
        for embedding in &embeddings[1..] {
            if embedding.len() != expected {
                return Err(ClusterError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
        }

        let matrix = similarity_matrix(&embeddings);
        let n = embeddings.len();
        let mut visited = vec![false; n];
        let mut groups = Vec::new();

        for i in 0..n {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            let mut members = vec![crops[i].take().expect("crop consumed once")];

            for j in (i + 1)..n {
                if !visited[j] && matrix[i][j] > self.threshold {
                    visited[j] = true;
                    members.push(crops[j].take().expect("crop consumed once"));
                }
            }

            groups.push(IdentityGroup { crops: members });
        }

        tracing::info!(
            records = records.len(),
            embedded = n,
            groups = groups.len(),
            "identity clustering complete"
        );

        Ok(groups)
    }
}

/// Full pairwise cosine-similarity matrix, retained order preserved.
fn similarity_matrix(embeddings: &[Embedding]) -> Vec<Vec<f32>> {
    let n = embeddings.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let sim = embeddings[i].similarity(&embeddings[j]);
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }
    matrix
}

//! The fixed-dimension, L2-normalized embedding vector shared by C4/C5.

use serde::{Deserialize, Serialize};

/// An L2-normalized embedding vector. Dimension is provider-global
/// (spec §4.3): all vectors produced by one provider configuration share a
/// dimension, checked by [`crate::EmbeddingProvider::dimension`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Normalize in place to unit L2 norm. A zero vector is left as-is
    /// (cosine similarity against it is defined as 0.0 below).
    pub fn normalize(mut self) -> Self {
        let norm = (self.0.iter().map(|x| x * x).sum::<f32>()).sqrt();
        if norm > f32::EPSILON {
            for x in self.0.iter_mut() {
                *x /= norm;
            }
        }
        self
    }
}

/// `similarity(a, b) -> float in [-1, 1]` (spec §4.3): cosine similarity.
///
/// Vectors are assumed L2-normalized already (true of every value this
/// crate produces), so the cosine reduces to a plain dot product; we still
/// guard against dimension mismatch and a degenerate zero vector.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.dimension() != b.dimension() || a.dimension() == 0 {
        return 0.0;
    }
    let dot: f32 = a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = Embedding(vec![0.6, 0.8, 0.0]).normalize();
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = Embedding(vec![1.0, 0.0]).normalize();
        let b = Embedding(vec![0.0, 1.0]).normalize();
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_yields_zero() {
        let a = Embedding(vec![1.0, 0.0]).normalize();
        let b = Embedding(vec![1.0, 0.0, 0.0]).normalize();
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}

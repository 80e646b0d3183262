//! `LocalProvider` — deterministic hash-based pseudo-embedding.
//!
//! Used in tests and as the fallback target when the remote provider is
//! `ProviderDegraded` (spec §4.3/§7). No network, fixed seed, so it is
//! reproducible across processes and implementations.

use crate::error::{EmbedError, Result};
use crate::traits::{EmbedOutcome, EmbeddingProvider};
use crate::vector::Embedding;
use async_trait::async_trait;

/// Domain-separation seed for the BLAKE3 keyed stream. Changing this value
/// changes every embedding this provider has ever produced, so it is fixed
/// for the life of a provider "version" (spec §4.3: "deterministic for a
/// given provider version").
const LOCAL_PROVIDER_SEED: &[u8] = b"stat7-embed/local-provider/v1";

#[derive(Debug, Clone)]
pub struct LocalProvider {
    dimension: usize,
}

impl LocalProvider {
    pub fn new(dimension: usize) -> Self {
        LocalProvider { dimension }
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        LocalProvider::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed_checked(&self, text: &str) -> Result<EmbedOutcome> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(EmbedOutcome {
            embedding: hash_embed(text, self.dimension),
            degraded: false,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Expand `text` into a `dim`-float pseudo-embedding using a BLAKE3 XOF
/// (extensible output function) keyed by [`LOCAL_PROVIDER_SEED`]. Each
/// float is derived from 4 stream bytes, mapped into `[-1, 1]`, then the
/// whole vector is L2-normalized.
fn hash_embed(text: &str, dim: usize) -> Embedding {
    let normalized = text.trim().to_lowercase();
    let mut hasher = blake3::Hasher::new();
    hasher.update(LOCAL_PROVIDER_SEED);
    hasher.update(normalized.as_bytes());
    let mut reader = hasher.finalize_xof();

    let mut values = Vec::with_capacity(dim);
    let mut buf = [0u8; 4];
    for _ in 0..dim {
        reader.fill(&mut buf);
        let raw = u32::from_le_bytes(buf);
        // map u32 -> [-1, 1]
        let v = (raw as f64 / u32::MAX as f64) * 2.0 - 1.0;
        values.push(v as f32);
    }
    Embedding(values).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_produces_same_embedding() {
        let p = LocalProvider::new(32);
        let a = p.embed("hello world").await.unwrap();
        let b = p.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn is_case_and_whitespace_insensitive() {
        let p = LocalProvider::new(32);
        let a = p.embed("Hello World").await.unwrap();
        let b = p.embed("  hello world  ").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_produces_different_embedding() {
        let p = LocalProvider::new(32);
        let a = p.embed("alpha").await.unwrap();
        let b = p.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_l2_normalized() {
        let p = LocalProvider::new(64);
        let v = p.embed("normalize me").await.unwrap();
        let norm: f32 = v.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let p = LocalProvider::new(32);
        assert!(matches!(p.embed("   ").await, Err(EmbedError::EmptyInput)));
    }
}

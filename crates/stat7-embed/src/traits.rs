//! The `EmbeddingProvider` capability (spec §4.3, §9: "define each as a
//! capability set ... select an implementation at construction time").

use crate::error::Result;
use crate::vector::Embedding;
use async_trait::async_trait;

/// Result of an embedding attempt, including whether it fell back to a
/// degraded (local) path (spec §4.3/§7 `ProviderDegraded`).
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedOutcome {
    pub embedding: Embedding,
    pub degraded: bool,
}

/// `embed(text) -> vector[D]` (spec §4.3). Implementations are deterministic
/// for a given provider version and always return L2-normalized vectors of
/// [`EmbeddingProvider::dimension`] length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`, reporting whether the result came from a degraded
    /// fallback path. This is the method implementations provide.
    async fn embed_checked(&self, text: &str) -> Result<EmbedOutcome>;

    /// Convenience wrapper over [`Self::embed_checked`] for callers that do
    /// not care about degradation (e.g. unit tests).
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_checked(text).await?.embedding)
    }

    fn dimension(&self) -> usize;

    /// Provider identity, used in logs and in the `degraded_embedding`
    /// bookkeeping upstream.
    fn name(&self) -> &'static str;
}

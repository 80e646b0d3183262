//! `RemoteProvider` — an HTTP-backed embedding provider with a bounded
//! retry budget and a text-SHA256-keyed cache (spec §4.3).

use crate::error::Result;
use crate::local::LocalProvider;
use crate::traits::{EmbedOutcome, EmbeddingProvider};
use crate::vector::Embedding;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Remote, HTTP-backed embedding provider. Falls back to a [`LocalProvider`]
/// within a bounded retry budget on timeout, tagging the result
/// `degraded=true` per spec §4.3/§7.
pub struct RemoteProvider {
    client: reqwest::Client,
    url: String,
    dimension: usize,
    max_attempts: u32,
    call_timeout: Duration,
    cache: DashMap<[u8; 32], Embedding>,
    fallback: LocalProvider,
}

impl RemoteProvider {
    pub fn new(url: impl Into<String>, dimension: usize) -> Self {
        RemoteProvider {
            client: reqwest::Client::new(),
            url: url.into(),
            dimension,
            max_attempts: 2,
            call_timeout: Duration::from_millis(500),
            cache: DashMap::new(),
            fallback: LocalProvider::new(dimension),
        }
    }

    pub fn with_retry_budget(mut self, max_attempts: u32, call_timeout: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.call_timeout = call_timeout;
        self
    }

    fn cache_key(text: &str) -> [u8; 32] {
        let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    async fn call_once(&self, text: &str) -> Result<Embedding> {
        let resp = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| crate::error::EmbedError::Remote(e.to_string()))?;
        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| crate::error::EmbedError::Remote(e.to_string()))?;
        if body.embedding.len() != self.dimension {
            return Err(crate::error::EmbedError::DimensionMismatch {
                got: body.embedding.len(),
                expected: self.dimension,
            });
        }
        Ok(Embedding(body.embedding).normalize())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    async fn embed_checked(&self, text: &str) -> Result<EmbedOutcome> {
        let key = Self::cache_key(text);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(EmbedOutcome {
                embedding: cached.clone(),
                degraded: false,
            });
        }

        for attempt in 1..=self.max_attempts {
            match tokio::time::timeout(self.call_timeout, self.call_once(text)).await {
                Ok(Ok(embedding)) => {
                    self.cache.insert(key, embedding.clone());
                    return Ok(EmbedOutcome {
                        embedding,
                        degraded: false,
                    });
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "remote embedding call failed");
                }
                Err(_) => {
                    warn!(attempt, timeout_ms = self.call_timeout.as_millis() as u64, "remote embedding call timed out");
                }
            }
        }

        warn!(
            attempts = self.max_attempts,
            "remote embedding provider exhausted retry budget, falling back to local"
        );
        let fallback = self.fallback.embed_checked(text).await?;
        Ok(EmbedOutcome {
            embedding: fallback.embedding,
            degraded: true,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_local_and_tags_degraded() {
        // Port 1 is reserved and will refuse the connection immediately.
        let provider = RemoteProvider::new("http://127.0.0.1:1/embed", 16)
            .with_retry_budget(1, Duration::from_millis(50));
        let outcome = provider.embed_checked("hello").await.unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.embedding.dimension(), 16);
    }

    #[tokio::test]
    async fn fallback_is_deterministic_across_calls() {
        let provider = RemoteProvider::new("http://127.0.0.1:1/embed", 16)
            .with_retry_budget(1, Duration::from_millis(50));
        let a = provider.embed_checked("same text").await.unwrap();
        let b = provider.embed_checked("same text").await.unwrap();
        assert_eq!(a.embedding, b.embedding);
    }
}

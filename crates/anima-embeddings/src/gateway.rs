//! The embedding gateway.
//!
//! One entry point for every component that needs a vector: validates
//! input, consults the cache, walks the provider chain with exponential
//! backoff, enforces unit length and the deployment dimension.

use std::time::Duration;

use tracing::{debug, warn};

use anima_core::config::EmbeddingConfig;
use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::memory::Memory;
use anima_core::models::CacheStats;

use crate::cache::EmbeddingCache;
use crate::providers::{self, EmbeddingProvider};
use crate::vector::l2_normalize;

/// An embedding plus the tag of whatever produced it.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub vector: Vec<f32>,
    pub provider: String,
}

pub struct EmbeddingGateway {
    chain: Vec<Box<dyn EmbeddingProvider>>,
    cache: EmbeddingCache,
    config: EmbeddingConfig,
}

impl EmbeddingGateway {
    pub fn new(config: EmbeddingConfig) -> Self {
        let chain = providers::build_chain(&config);
        let cache = EmbeddingCache::from_config(&config);
        Self {
            chain,
            cache,
            config,
        }
    }

    /// Embed text, going through the cache.
    ///
    /// Rejects empty input. The returned vector always has unit norm and
    /// the configured dimension.
    pub async fn embed(&self, text: &str) -> AnimaResult<EmbeddedText> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AnimaError::validation("text must be non-empty"));
        }

        let fingerprint = Memory::fingerprint(trimmed);
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "embedding cache hit");
            return Ok(EmbeddedText {
                vector: cached.vector,
                provider: cached.provider,
            });
        }

        let (mut vector, provider) = self.embed_uncached(trimmed).await?;

        if vector.len() != self.config.dimensions {
            return Err(AnimaError::embedding(format!(
                "{provider} returned {} dimensions, deployment uses {}",
                vector.len(),
                self.config.dimensions
            )));
        }
        if !l2_normalize(&mut vector) {
            return Err(AnimaError::embedding(format!(
                "{provider} returned a zero vector"
            )));
        }

        self.cache
            .insert(fingerprint, vector.clone(), provider.clone());
        Ok(EmbeddedText { vector, provider })
    }

    /// Walk the chain: each provider gets its retry budget with
    /// exponential backoff before the next one is tried.
    async fn embed_uncached(&self, text: &str) -> AnimaResult<(Vec<f32>, String)> {
        let mut last_error = AnimaError::embedding("no embedding provider configured");

        for provider in &self.chain {
            match self.try_provider(provider.as_ref(), text).await {
                Ok(vector) => return Ok((vector, provider.name().to_string())),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "embedding provider exhausted retries, failing over"
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn try_provider(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
    ) -> AnimaResult<Vec<f32>> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff_base_ms * (1 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match provider.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    debug!(
                        provider = provider.name(),
                        attempt,
                        error = %e,
                        "embedding attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AnimaError::embedding("provider produced no result")))
    }

    /// Tag of the first provider in the chain.
    pub fn primary_provider(&self) -> &str {
        self.chain
            .first()
            .map(|p| p.name())
            .unwrap_or("none")
    }

    /// Whether the configured provider can answer without network I/O.
    pub fn is_local(&self) -> bool {
        self.chain.first().map(|p| p.is_local()).unwrap_or(false)
    }

    /// Cheap readiness probe for the health endpoint. Local chains
    /// short-circuit; remote chains embed a probe token.
    pub async fn health_check(&self) -> bool {
        if self.is_local() {
            return true;
        }
        self.embed("health probe").await.is_ok()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_gateway() -> EmbeddingGateway {
        EmbeddingGateway::new(EmbeddingConfig::default())
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let gw = local_gateway();
        assert!(matches!(
            gw.embed("").await,
            Err(AnimaError::Validation { .. })
        ));
        assert!(matches!(
            gw.embed("   \n\t").await,
            Err(AnimaError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn produces_unit_vectors() {
        let gw = local_gateway();
        let out = gw.embed("resonance accumulates around attractors").await.unwrap();
        assert_eq!(out.vector.len(), 384);
        let norm: f32 = out.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(out.provider, "local");
    }

    #[tokio::test]
    async fn second_call_hits_cache() {
        let gw = local_gateway();
        let a = gw.embed("cached text").await.unwrap();
        let b = gw.embed("cached text").await.unwrap();
        assert_eq!(a.vector, b.vector);
        let stats = gw.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn whitespace_variants_share_a_fingerprint() {
        let gw = local_gateway();
        let a = gw.embed("trimmed text").await.unwrap();
        let b = gw.embed("  trimmed text  ").await.unwrap();
        assert_eq!(a.vector, b.vector);
        assert_eq!(gw.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn local_health_short_circuits() {
        assert!(local_gateway().health_check().await);
    }
}

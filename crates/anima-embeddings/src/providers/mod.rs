//! Embedding providers.
//!
//! Selection is table-driven from config: a tagged provider kind maps to
//! a concrete provider, plus the failover chain behind it.

pub mod local;
pub mod remote;

use async_trait::async_trait;

use anima_core::config::{EmbeddingConfig, ProviderKind};
use anima_core::errors::AnimaResult;

pub use local::LocalHashProvider;
pub use remote::RemoteProvider;

/// Capability contract every provider implements.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Produce a raw (not yet normalised) vector for the text.
    async fn embed(&self, text: &str) -> AnimaResult<Vec<f32>>;

    /// Stable tag reported back to clients (`local`, `remote-primary`, …).
    fn name(&self) -> &str;

    /// Whether the provider can be used without network I/O.
    fn is_local(&self) -> bool {
        false
    }
}

/// Build the ordered provider chain for the configured kind.
///
/// The first entry is the configured provider; later entries are the
/// failover alternates. A local provider terminates every chain so the
/// gateway always has a last resort.
pub fn build_chain(cfg: &EmbeddingConfig) -> Vec<Box<dyn EmbeddingProvider>> {
    let local: Box<dyn EmbeddingProvider> = Box::new(LocalHashProvider::new(cfg.dimensions));
    match cfg.provider {
        ProviderKind::Local => vec![local],
        ProviderKind::RemotePrimary => {
            let mut chain: Vec<Box<dyn EmbeddingProvider>> = Vec::new();
            if let Some(endpoint) = &cfg.endpoint {
                chain.push(Box::new(RemoteProvider::new(
                    "remote-primary",
                    endpoint.clone(),
                    cfg.api_key.clone(),
                )));
            }
            if let Some(endpoint) = &cfg.fallback_endpoint {
                chain.push(Box::new(RemoteProvider::new(
                    "remote-secondary",
                    endpoint.clone(),
                    cfg.api_key.clone(),
                )));
            }
            chain.push(local);
            chain
        }
        ProviderKind::RemoteSecondary => {
            let mut chain: Vec<Box<dyn EmbeddingProvider>> = Vec::new();
            if let Some(endpoint) = &cfg.endpoint {
                chain.push(Box::new(RemoteProvider::new(
                    "remote-secondary",
                    endpoint.clone(),
                    cfg.api_key.clone(),
                )));
            }
            chain.push(local);
            chain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_kind_builds_single_provider() {
        let cfg = EmbeddingConfig::default();
        let chain = build_chain(&cfg);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "local");
    }

    #[test]
    fn remote_primary_chains_to_local() {
        let cfg = EmbeddingConfig {
            provider: ProviderKind::RemotePrimary,
            endpoint: Some("http://embed-a.internal".to_string()),
            fallback_endpoint: Some("http://embed-b.internal".to_string()),
            ..Default::default()
        };
        let chain = build_chain(&cfg);
        let names: Vec<&str> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["remote-primary", "remote-secondary", "local"]);
    }
}

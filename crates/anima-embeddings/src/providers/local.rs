//! Deterministic local provider.
//!
//! Hashes terms into fixed-dimension buckets weighted by term frequency.
//! Not as semantically rich as a neural model, but always available and
//! fully deterministic — the air-gapped last resort of every chain.

use std::collections::HashMap;

use async_trait::async_trait;

use anima_core::errors::AnimaResult;

use super::EmbeddingProvider;

pub struct LocalHashProvider {
    dimensions: usize,
}

impl LocalHashProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Hash a term into a bucket index using FNV-1a.
    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) % dims
    }

    /// Lowercase alphanumeric terms, two characters or longer.
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() >= 2)
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn term_vector(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return vec;
        }

        let mut tf: HashMap<String, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.clone()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in &tf {
            let freq = count / total;
            // Longer terms carry more signal; short ones are likely stopwords.
            let weight = 1.0 + (term.len() as f32).ln();
            let bucket = Self::hash_term(term, self.dimensions);
            vec[bucket] += freq * weight;
        }

        vec
    }
}

#[async_trait]
impl EmbeddingProvider for LocalHashProvider {
    async fn embed(&self, text: &str) -> AnimaResult<Vec<f32>> {
        Ok(self.term_vector(text))
    }

    fn name(&self) -> &str {
        "local"
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalHashProvider {
        LocalHashProvider::new(384)
    }

    #[tokio::test]
    async fn produces_configured_dimensions() {
        let v = provider().embed("hello world embedding").await.unwrap();
        assert_eq!(v.len(), 384);
    }

    #[tokio::test]
    async fn is_deterministic() {
        let p = provider();
        let a = p.embed("memory substrate").await.unwrap();
        let b = p.embed("memory substrate").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let p = provider();
        let a = p.embed("the gravity of resonance").await.unwrap();
        let b = p.embed("an unrelated shopping list").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn whitespace_only_yields_zero_vector() {
        let v = provider().embed("   ").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}

//! Remote HTTP embedding provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use anima_core::errors::{AnimaError, AnimaResult};

use super::EmbeddingProvider;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Talks to a remote text-to-vector service over JSON.
pub struct RemoteProvider {
    name: &'static str,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteProvider {
    pub fn new(name: &'static str, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            name,
            endpoint,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    async fn embed(&self, text: &str) -> AnimaResult<Vec<f32>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnimaError::embedding(format!("{}: {e}", self.name)))?;

        if !response.status().is_success() {
            return Err(AnimaError::embedding(format!(
                "{} returned {}",
                self.name,
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AnimaError::embedding(format!("{}: bad response body: {e}", self.name)))?;

        if body.embedding.is_empty() {
            return Err(AnimaError::embedding(format!(
                "{} returned an empty embedding",
                self.name
            )));
        }

        Ok(body.embedding)
    }

    fn name(&self) -> &str {
        self.name
    }
}

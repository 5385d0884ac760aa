use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingBackend, EmbeddingConfig, GenerationConfig};
use crate::semantic::{MIN_EMBEDDING_DIM, embed_text_local};

use super::GenerationError;
use super::client::{RetryPolicy, build_http_client, map_transport_error};

pub trait Embedder {
    fn identity(&self) -> String;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError>;
}

pub fn build_embedder(
    config: &EmbeddingConfig,
    generation: &GenerationConfig,
) -> Result<Arc<dyn Embedder>, GenerationError> {
    match config.backend {
        EmbeddingBackend::LocalHash => Ok(Arc::new(LocalHashEmbedder::new(
            &config.model,
            config.dimensions,
        ))),
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            &generation.base_url,
            &config.model,
            config.dimensions,
            generation.timeout_secs,
            RetryPolicy::new(generation.max_attempts, generation.retry_backoff_ms),
        )?)),
    }
}

pub struct LocalHashEmbedder {
    model: String,
    dimensions: usize,
}

impl LocalHashEmbedder {
    pub fn new(model: &str, dimensions: usize) -> Self {
        Self {
            model: model.to_string(),
            dimensions: dimensions.max(MIN_EMBEDDING_DIM),
        }
    }
}

impl Embedder for LocalHashEmbedder {
    fn identity(&self) -> String {
        format!(
            "{}:{}:{}",
            EmbeddingBackend::LocalHash.as_str(),
            self.model,
            self.dimensions
        )
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        Ok(embed_text_local(text, self.dimensions))
    }
}

pub struct OllamaEmbedder {
    base_url: String,
    client: reqwest::blocking::Client,
    model: String,
    dimensions: usize,
    timeout_secs: u64,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        dimensions: usize,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout_secs)?,
            model: model.to_string(),
            dimensions,
            timeout_secs,
            retry,
        })
    }

    fn embed_once(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .map_err(|e| map_transport_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaEmbeddingResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        if parsed.embedding.len() != self.dimensions {
            return Err(GenerationError::ResponseParsing(format!(
                "embedding model '{}' returned {} dimensions, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dimensions
            )));
        }

        Ok(parsed.embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn identity(&self) -> String {
        format!(
            "{}:{}:{}",
            EmbeddingBackend::Ollama.as_str(),
            self.model,
            self.dimensions
        )
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        self.retry.run("embedding", || self.embed_once(text))
    }
}

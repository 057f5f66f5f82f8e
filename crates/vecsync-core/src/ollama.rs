//! Ollama embeddings, for running against a local model instead of OpenAI.

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;

use crate::embeddings::{EmbeddingError, EmbeddingProvider};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const MAX_BATCH_SIZE: usize = 512;

/// Thin wrapper around Ollama's embedding endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddings {
    inner: Ollama,
    model: String,
}

impl OllamaEmbeddings {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str, model: impl Into<String>) -> Result<Self, url::ParseError> {
        let inner = Ollama::try_new(url)?;
        Ok(Self {
            inner,
            model: model.into(),
        })
    }

    async fn generate(&self, input: EmbeddingsInput) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let req = GenerateEmbeddingsRequest::new(self.model.clone(), input);
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(|e| EmbeddingError::TransientNetwork(format!("Ollama request failed: {e}")))?;
        Ok(res.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.generate(EmbeddingsInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Malformed("Ollama returned no embedding".into()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.generate(EmbeddingsInput::Multiple(texts.to_vec())).await
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_url() {
        assert!(OllamaEmbeddings::from_url("not a url", DEFAULT_EMBED_MODEL).is_err());
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let client = OllamaEmbeddings::from_url(DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL).unwrap();
        assert!(client.embed_documents(&[]).await.unwrap().is_empty());
        assert_eq!(client.name(), "ollama");
    }
}

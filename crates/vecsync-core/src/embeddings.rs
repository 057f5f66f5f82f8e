//! Embedding providers and the batching/retrying adapter the pipeline talks to.

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::{RetryPolicy, Retryable};

/// One upstream embedding service. Each call is a single request; batching and
/// retries live in [`Embedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// One vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Largest number of inputs the service accepts in one request.
    fn max_batch_size(&self) -> usize;

    fn name(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider rate limited the request: {0}")]
    RateLimited(String),
    #[error("embedding provider rejected the credentials: {0}")]
    AuthFailure(String),
    #[error("embedding request failed in transit: {0}")]
    TransientNetwork(String),
    #[error("embedding request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    #[error("embedding provider returned an empty vector for the dimension probe")]
    EmptyProbe,
    #[error("embedding {position} has dimension {found}, expected {expected}")]
    InconsistentDimension {
        position: usize,
        expected: usize,
        found: usize,
    },
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::TransientNetwork(_))
    }
}

/// Wraps a provider with bounded batches, backoff on retryable failures and
/// dimension checks.
pub struct Embedder<P> {
    provider: P,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<P: EmbeddingProvider> Embedder<P> {
    /// `batch_size` is capped at the provider's own limit.
    pub fn new(provider: P, batch_size: usize, retry: RetryPolicy) -> Self {
        let batch_size = batch_size.clamp(1, provider.max_batch_size().max(1));
        Self {
            provider,
            batch_size,
            retry,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.retry
            .run("embed query", || self.provider.embed_query(text))
            .await
    }

    /// Embeds a fixed probe string and returns the model's output dimension.
    pub async fn probe_dimension(&self, probe: &str) -> Result<usize, EmbeddingError> {
        let v = self.embed_one(probe).await?;
        if v.is_empty() {
            return Err(EmbeddingError::EmptyProbe);
        }
        tracing::info!("{} embedding dimension: {}", self.provider.name(), v.len());
        Ok(v.len())
    }

    /// Embeds `texts` in batches, keeping output aligned with input.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            let what = format!("embed batch {n}");
            let out = self
                .retry
                .run(&what, || self.provider.embed_documents(batch))
                .await?;
            if out.len() != batch.len() {
                return Err(EmbeddingError::Malformed(format!(
                    "{} returned {} embeddings for {} inputs",
                    self.provider.name(),
                    out.len(),
                    batch.len()
                )));
            }
            tracing::debug!("embedded batch {} ({} texts)", n, batch.len());
            vectors.extend(out);
        }
        Ok(vectors)
    }

    /// Like [`embed_batch`](Self::embed_batch), and every vector must have length `dimension`.
    pub async fn embed_with_dimension(
        &self,
        texts: &[String],
        dimension: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self.embed_batch(texts).await?;
        if let Some((position, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(EmbeddingError::InconsistentDimension {
                position,
                expected: dimension,
                found: v.len(),
            });
        }
        Ok(vectors)
    }
}

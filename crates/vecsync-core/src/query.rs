//! Read-only similarity search, used to check an ingestion landed.

use thiserror::Error;

use crate::chunks::Metadata;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, Embedder};
use crate::store::{IndexError, VectorIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl SearchHit {
    /// The `source` path stored with the chunk, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("query against {index} failed: {source}")]
    Index { index: String, source: IndexError },
}

/// Embeds `query` and returns the `top_k` nearest records of `index`, best first.
pub async fn search<P: EmbeddingProvider>(
    embedder: &Embedder<P>,
    store: &dyn VectorIndex,
    index: &str,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>, QueryError> {
    let vector = embedder.embed_one(query).await?;
    let matches = store
        .query(index, &vector, top_k)
        .await
        .map_err(|source| QueryError::Index {
            index: index.to_string(),
            source,
        })?;
    Ok(matches
        .into_iter()
        .map(|m| SearchHit {
            id: m.id,
            score: m.score,
            metadata: m.metadata,
        })
        .collect())
}

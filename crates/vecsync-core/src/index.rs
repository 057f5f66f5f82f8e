//! Ingestion pipeline: scan → chunk → embed → reconcile index → wait ready → upsert → verify.

use thiserror::Error;

use crate::chunks::{chunk_documents, Chunk};
use crate::config::{Config, DocumentsConfig};
use crate::documents::{scan_documents, ScanError};
use crate::embeddings::{EmbeddingError, EmbeddingProvider, Embedder};
use crate::query::{search, SearchHit};
use crate::readiness::{wait_ready, ReadinessError};
use crate::reconcile::reconcile;
use crate::registry::{IndexRegistry, IndexSpec, RegistryError};
use crate::store::VectorIndex;
use crate::upsert::{upsert_chunks, UpsertError, UpsertOptions};

/// Outcome of the post-ingestion sample query. Never fails the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Skipped,
    Hits(Vec<SearchHit>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub index_name: String,
    pub created: bool,
    pub dimension: usize,
    pub chunks: usize,
    pub upserted: usize,
    pub verification: Verification,
}

/// Scans the configured folder and chunks every matching document.
pub fn load_chunks(docs: &DocumentsConfig) -> Result<Vec<Chunk>, ScanError> {
    let documents = scan_documents(&docs.dir, &docs.glob)?;
    let chunks = chunk_documents(&documents, docs.chunk_size, docs.chunk_overlap);
    tracing::info!(
        "loaded {} document chunk(s) from {} file(s)",
        chunks.len(),
        documents.len()
    );
    Ok(chunks)
}

/// Runs one ingestion of `chunks` into the index named by `config.index.name`
/// (or a compatible alternate).
pub async fn run_ingestion<P: EmbeddingProvider>(
    config: &Config,
    chunks: &[Chunk],
    embedder: &Embedder<P>,
    registry: &dyn IndexRegistry,
    store: &dyn VectorIndex,
) -> Result<IngestReport, PipelineError> {
    let dimension = embedder.probe_dimension(&config.embedding.probe_text).await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_with_dimension(&texts, dimension).await?;
    tracing::info!("embedded {} chunk(s)", vectors.len());

    let plan = reconcile(registry, &config.index.name, dimension).await;
    let index = plan.target_name;
    if plan.must_create {
        let spec = IndexSpec {
            name: index.clone(),
            dimension,
            metric: config.index.metric.clone(),
            cloud: config.index.cloud.clone(),
            region: config.index.region.clone(),
        };
        tracing::info!("creating index {} with dimension {}", index, dimension);
        registry
            .create_index(&spec)
            .await
            .map_err(|source| PipelineError::IndexCreate {
                index: index.clone(),
                source,
            })?;
    }

    let descriptor = wait_ready(
        registry,
        &index,
        config.index.ready_timeout(),
        config.index.poll_interval(),
    )
    .await?;
    if let Some(found) = descriptor.dimension.filter(|d| *d != dimension) {
        return Err(PipelineError::DimensionChanged {
            index,
            expected: dimension,
            found,
        });
    }
    tracing::info!("using index {}", index);

    let opts = UpsertOptions {
        batch_size: config.index.upsert_batch_size,
        concurrency: config.index.upsert_concurrency,
        retry: config.retry.policy(),
    };
    let upserted = upsert_chunks(store, &index, dimension, chunks, &vectors, &opts).await?;

    let verification = verify(config, embedder, store, &index).await;
    Ok(IngestReport {
        index_name: index,
        created: plan.must_create,
        dimension,
        chunks: chunks.len(),
        upserted: upserted.records,
        verification,
    })
}

async fn verify<P: EmbeddingProvider>(
    config: &Config,
    embedder: &Embedder<P>,
    store: &dyn VectorIndex,
    index: &str,
) -> Verification {
    let query = config.verify.query.trim();
    if query.is_empty() || config.verify.top_k == 0 {
        return Verification::Skipped;
    }
    match search(embedder, store, index, query, config.verify.top_k).await {
        Ok(hits) => {
            tracing::info!("sample search returned {} hit(s)", hits.len());
            Verification::Hits(hits)
        }
        Err(e) => {
            tracing::warn!("sample search failed (ingestion already committed): {}", e);
            Verification::Failed(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("failed to create index {index}: {source}")]
    IndexCreate { index: String, source: RegistryError },
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    #[error("index {index} reports dimension {found}, embeddings have {expected}")]
    DimensionChanged {
        index: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Upsert(#[from] UpsertError),
}

impl PipelineError {
    /// Stable name of the failure for user-facing reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scan(_) => "ScanError",
            Self::Embedding(EmbeddingError::AuthFailure(_)) => "AuthFailure",
            Self::Embedding(EmbeddingError::RateLimited(_)) => "RateLimited",
            Self::Embedding(EmbeddingError::TransientNetwork(_)) => "TransientNetworkError",
            Self::Embedding(_) => "EmbeddingError",
            Self::IndexCreate { .. } => "IndexCreateError",
            Self::Readiness(ReadinessError::Timeout { .. }) => "Timeout",
            Self::DimensionChanged { .. } => "DimensionMismatch",
            Self::Upsert(_) => "UpsertError",
        }
    }

    /// The index the failure concerns, when there is one.
    pub fn index(&self) -> Option<&str> {
        match self {
            Self::IndexCreate { index, .. } | Self::DimensionChanged { index, .. } => Some(index.as_str()),
            Self::Readiness(ReadinessError::Timeout { index, .. }) => Some(index.as_str()),
            Self::Upsert(UpsertError::Batch { index, .. } | UpsertError::DimensionMismatch { index, .. }) => {
                Some(index.as_str())
            }
            _ => None,
        }
    }

    /// Records known to be written before an upsert failure.
    pub fn committed_records(&self) -> Option<usize> {
        match self {
            Self::Upsert(UpsertError::Batch { committed_records, .. }) => Some(*committed_records),
            _ => None,
        }
    }
}

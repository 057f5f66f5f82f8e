//! Turns chunks and their vectors into records and writes them in bounded batches.

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::chunks::Chunk;
use crate::retry::RetryPolicy;
use crate::store::{IndexError, UpsertRecord, VectorIndex};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub batch_size: usize,
    /// Batches in flight at once; results are still committed in batch order.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub records: usize,
    pub batches: usize,
}

#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
    #[error("vector for {id} has dimension {found}, index {index} expects {expected}")]
    DimensionMismatch {
        id: String,
        index: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "upsert into {index} failed at batch {batch} after retries; \
         {committed_batches} batch(es) / {committed_records} record(s) committed: {source}"
    )]
    Batch {
        index: String,
        /// Zero-based index of the batch that failed.
        batch: usize,
        /// Batches `0..committed_batches` are known to be written.
        committed_batches: usize,
        committed_records: usize,
        source: IndexError,
    },
}

/// Zips chunks with vectors into records. Fails before any I/O if the lengths differ
/// or a vector does not have the index's dimension.
pub fn build_records(
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    index: &str,
    dimension: usize,
) -> Result<Vec<UpsertRecord>, UpsertError> {
    if chunks.len() != vectors.len() {
        return Err(UpsertError::LengthMismatch {
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }
    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            if vector.len() != dimension {
                return Err(UpsertError::DimensionMismatch {
                    id: chunk.id.clone(),
                    index: index.to_string(),
                    expected: dimension,
                    found: vector.len(),
                });
            }
            Ok(UpsertRecord {
                id: chunk.id.clone(),
                values: vector.clone(),
                metadata: chunk.metadata.clone(),
            })
        })
        .collect()
}

/// Writes `chunks` with their `vectors` into `index` (of `dimension`).
///
/// Record ids come from the chunks, so running this twice over the same corpus
/// overwrites instead of duplicating. Each batch is retried per `opts.retry`; the first
/// batch that still fails stops the run, drops any batches in flight, and the error
/// says how many leading batches were committed.
pub async fn upsert_chunks(
    store: &dyn VectorIndex,
    index: &str,
    dimension: usize,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    opts: &UpsertOptions,
) -> Result<UpsertReport, UpsertError> {
    let records = build_records(chunks, vectors, index, dimension)?;
    let batch_size = opts.batch_size.max(1);
    let total_batches = records.len().div_ceil(batch_size);
    tracing::info!(
        "upserting {} record(s) into {} in {} batch(es)",
        records.len(),
        index,
        total_batches
    );

    let mut results = std::pin::pin!(stream::iter(records.chunks(batch_size).enumerate())
        .map(|(n, batch)| async move {
            let what = format!("upsert batch {n} into {index}");
            let out = opts.retry.run(&what, || store.upsert(index, batch)).await;
            (n, batch.len(), out)
        })
        .buffered(opts.concurrency.max(1)));

    let mut report = UpsertReport {
        records: 0,
        batches: 0,
    };
    while let Some((n, len, out)) = results.next().await {
        match out {
            Ok(acknowledged) => {
                if acknowledged != len {
                    tracing::warn!("batch {} sent {} record(s), service acknowledged {}", n, len, acknowledged);
                }
                report.records += len;
                report.batches += 1;
                tracing::debug!("batch {}/{} committed", n + 1, total_batches);
            }
            Err(source) => {
                return Err(UpsertError::Batch {
                    index: index.to_string(),
                    batch: n,
                    committed_batches: report.batches,
                    committed_records: report.records,
                    source,
                });
            }
        }
    }
    tracing::info!("upserted {} record(s) into {}", report.records, index);
    Ok(report)
}

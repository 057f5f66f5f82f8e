//! Data plane of the vector index service: writing records and similarity queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunks::Metadata;
use crate::retry::Retryable;

/// One vector as written to the index. `id` is stable per chunk so rewrites overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// A query result, highest score first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or overwrites `records` by id. Returns how many the service acknowledged.
    async fn upsert(&self, index: &str, records: &[UpsertRecord]) -> Result<usize, IndexError>;

    async fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError>;
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index {0} has no data-plane host")]
    MissingHost(String),
    #[error("index request failed: {0}")]
    Request(String),
    #[error("index returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable index response: {0}")]
    Decode(String),
}

impl Retryable for IndexError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingHost(_) | Self::Decode(_) => false,
        }
    }
}

//! Control plane of the vector index service: which indexes exist, their shape, creation.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// What we know about a remote index after normalising the describe response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    /// `None` when the response did not expose a readable dimension.
    pub dimension: Option<usize>,
    pub ready: bool,
    pub metric: Option<String>,
    /// Data-plane host for upserts and queries.
    pub host: Option<String>,
}

impl IndexDescriptor {
    /// Normalises the service's describe payload. Dimension comes from the top-level
    /// `dimension` field, else `database.dimension`; readiness from `status.ready`,
    /// else `status.state == "Ready"`. Anything unreadable stays unknown.
    pub fn from_describe_response(name: &str, body: &Value) -> Self {
        let dimension = body
            .get("dimension")
            .and_then(Value::as_u64)
            .or_else(|| body.pointer("/database/dimension").and_then(Value::as_u64))
            .and_then(|d| usize::try_from(d).ok());
        let ready = body
            .pointer("/status/ready")
            .and_then(Value::as_bool)
            .or_else(|| {
                body.pointer("/status/state")
                    .and_then(Value::as_str)
                    .map(|s| s.eq_ignore_ascii_case("ready"))
            })
            .unwrap_or(false);
        let metric = body
            .get("metric")
            .or_else(|| body.pointer("/database/metric"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let host = body
            .get("host")
            .or_else(|| body.pointer("/status/host"))
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        Self {
            name: body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            dimension,
            ready,
            metric,
            host,
        }
    }
}

/// Parameters for creating a serverless index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
}

#[async_trait]
pub trait IndexRegistry: Send + Sync {
    async fn list_index_names(&self) -> Result<BTreeSet<String>, RegistryError>;

    async fn describe_index(&self, name: &str) -> Result<IndexDescriptor, RegistryError>;

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), RegistryError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("index {0} not found")]
    NotFound(String),
    #[error("index {0} already exists")]
    AlreadyExists(String),
    #[error("index service request failed: {0}")]
    Request(String),
    #[error("index service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable index service response: {0}")]
    Decode(String),
}

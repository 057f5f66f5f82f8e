//! Pinecone client: control plane (`/indexes`) and per-index data plane.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{IndexDescriptor, IndexRegistry, IndexSpec, RegistryError};
use crate::store::{IndexError, QueryMatch, UpsertRecord, VectorIndex};

pub const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

#[derive(Debug)]
pub struct PineconeClient {
    client: Client,
    controller_url: String,
    namespace: Option<String>,
    /// Data-plane URLs by index name, filled from describe responses.
    hosts: RwLock<HashMap<String, String>>,
}

impl PineconeClient {
    pub fn new(
        api_key: &str,
        controller_url: &str,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| RegistryError::Request("API key is not a valid header value".into()))?;
        headers.insert("Api-Key", key);
        headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RegistryError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            namespace,
            hosts: RwLock::new(HashMap::new()),
        })
    }

    fn remember_host(&self, descriptor: &IndexDescriptor) {
        if let Some(host) = &descriptor.host {
            if let Ok(mut hosts) = self.hosts.write() {
                hosts.insert(descriptor.name.clone(), data_plane_url(host));
            }
        }
    }

    fn cached_host(&self, index: &str) -> Option<String> {
        self.hosts.read().ok()?.get(index).cloned()
    }

    /// Data-plane URL for `index`, describing it once if we haven't seen it yet.
    async fn host_for(&self, index: &str) -> Result<String, IndexError> {
        if let Some(host) = self.cached_host(index) {
            return Ok(host);
        }
        let descriptor = self.describe_index(index).await.map_err(|e| match e {
            RegistryError::Status { status, body } => IndexError::Status { status, body },
            RegistryError::Decode(m) => IndexError::Decode(m),
            other => IndexError::Request(other.to_string()),
        })?;
        self.cached_host(&descriptor.name)
            .ok_or_else(|| IndexError::MissingHost(index.to_string()))
    }
}

fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

async fn error_body(resp: Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    (status, body)
}

#[async_trait]
impl IndexRegistry for PineconeClient {
    async fn list_index_names(&self) -> Result<BTreeSet<String>, RegistryError> {
        let resp = self
            .client
            .get(format!("{}/indexes", self.controller_url))
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let (status, body) = error_body(resp).await;
            return Err(RegistryError::Status { status, body });
        }
        let list: IndexList = resp
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        let names = list
            .indexes
            .iter()
            .filter_map(|i| i.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescriptor, RegistryError> {
        let resp = self
            .client
            .get(format!("{}/indexes/{}", self.controller_url, name))
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            let (status, body) = error_body(resp).await;
            return Err(RegistryError::Status { status, body });
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        let descriptor = IndexDescriptor::from_describe_response(name, &body);
        self.remember_host(&descriptor);
        Ok(descriptor)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), RegistryError> {
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: &spec.metric,
            spec: CreateSpec {
                serverless: Serverless {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        };
        let resp = self
            .client
            .post(format!("{}/indexes", self.controller_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(RegistryError::AlreadyExists(spec.name.clone())),
            _ => {
                let (status, body) = error_body(resp).await;
                Err(RegistryError::Status { status, body })
            }
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeClient {
    async fn upsert(&self, index: &str, records: &[UpsertRecord]) -> Result<usize, IndexError> {
        let host = self.host_for(index).await?;
        let body = UpsertRequest {
            vectors: records,
            namespace: self.namespace.as_deref(),
        };
        let resp = self
            .client
            .post(format!("{host}/vectors/upsert"))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let (status, body) = error_body(resp).await;
            return Err(IndexError::Status { status, body });
        }
        let parsed: UpsertResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(parsed.upserted_count.unwrap_or(records.len()))
    }

    async fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        let host = self.host_for(index).await?;
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let resp = self
            .client
            .post(format!("{host}/query"))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let (status, body) = error_body(resp).await;
            return Err(IndexError::Status { status, body });
        }
        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(parsed.matches)
    }
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<Value>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: CreateSpec<'a>,
}

#[derive(Serialize)]
struct CreateSpec<'a> {
    serverless: Serverless<'a>,
}

#[derive(Serialize)]
struct Serverless<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [UpsertRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

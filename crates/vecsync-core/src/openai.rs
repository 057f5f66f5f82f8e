//! OpenAI embeddings over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::embeddings::{EmbeddingError, EmbeddingProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
/// Inputs per request accepted by the embeddings endpoint.
pub const MAX_BATCH_SIZE: usize = 2048;

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbeddings {
    /// `base_url` defaults to the public API.
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingError::AuthFailure("API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::TransientNetwork(format!("failed to build HTTP client: {e}")))?;
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{base}/embeddings"),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, input: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
            encoding_format: "float",
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, text));
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        if parsed.data.len() != input.len() {
            return Err(EmbeddingError::Malformed(format!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut out = self.request(&[text]).await?;
        out.pop()
            .ok_or_else(|| EmbeddingError::Malformed("empty data array".into()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.request(&input).await
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn classify_status(status: StatusCode, body: String) -> EmbeddingError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingError::AuthFailure(body),
        StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited(body),
        s if s.is_server_error() => EmbeddingError::TransientNetwork(format!("{s}: {body}")),
        s => EmbeddingError::Rejected {
            status: s.as_u16(),
            body,
        },
    }
}

fn classify_transport(err: reqwest::Error) -> EmbeddingError {
    if err.is_decode() {
        EmbeddingError::Malformed(err.to_string())
    } else {
        EmbeddingError::TransientNetwork(err.to_string())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

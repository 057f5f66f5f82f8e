//! Run configuration (documents, embedding model, index settings) and API credentials.
//!
//! Everything here is loaded once by the caller and handed to components explicitly;
//! nothing in the core reads the process environment on its own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::pinecone::DEFAULT_CONTROLLER_URL;
use crate::{ollama, openai};
use crate::retry::RetryPolicy;

const CONFIG_FILENAME: &str = "vecsync.toml";

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub documents: DocumentsConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retry: RetryConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Folder holding the plain-text corpus.
    pub dir: PathBuf,
    /// Glob matched against paths relative to `dir`. `*` does not cross `/`.
    pub glob: String,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters of trailing context repeated at the start of the next chunk.
    pub chunk_overlap: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/new_articles"),
            glob: "*.txt".to_string(),
            chunk_size: 1000,
            chunk_overlap: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Model name. `None` uses the provider's default model.
    pub model: Option<String>,
    /// Provider endpoint. `None` uses the provider's public default.
    pub base_url: Option<String>,
    /// Texts per embedding request; further capped by the provider's own limit.
    pub batch_size: usize,
    pub request_timeout_secs: u64,
    /// Text embedded once per run to learn the model's output dimension.
    pub probe_text: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: None,
            base_url: None,
            batch_size: 256,
            request_timeout_secs: 30,
            probe_text: "sample".to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(m), _) => m.as_str(),
            (None, ProviderKind::OpenAi) => openai::DEFAULT_EMBED_MODEL,
            (None, ProviderKind::Ollama) => ollama::DEFAULT_EMBED_MODEL,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Preferred index name. A versioned alternate is used when it is incompatible.
    pub name: String,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub controller_url: String,
    pub ready_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub upsert_batch_size: usize,
    /// Upsert batches in flight at once. 1 means strictly sequential.
    pub upsert_concurrency: usize,
    pub namespace: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: "tester-index".to_string(),
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            controller_url: DEFAULT_CONTROLLER_URL.to_string(),
            ready_timeout_secs: 300,
            poll_interval_ms: 1000,
            upsert_batch_size: 100,
            upsert_concurrency: 1,
            namespace: None,
        }
    }
}

impl IndexConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 16_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Sample query run after ingestion. Empty skips verification.
    pub query: String,
    pub top_k: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            query: "was bihari rejected from reality shows ?".to_string(),
            top_k: 2,
        }
    }
}

impl Config {
    /// Rejects values that would make the pipeline loop or never make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.documents;
        if d.chunk_size == 0 {
            return Err(ConfigError::Invalid("documents.chunk_size must be > 0".into()));
        }
        if d.chunk_overlap >= d.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "documents.chunk_overlap ({}) must be smaller than chunk_size ({})",
                d.chunk_overlap, d.chunk_size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be > 0".into()));
        }
        let i = &self.index;
        if i.name.trim().is_empty() {
            return Err(ConfigError::Invalid("index.name must not be empty".into()));
        }
        if i.upsert_batch_size == 0 || i.upsert_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "index.upsert_batch_size and index.upsert_concurrency must be > 0".into(),
            ));
        }
        if i.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("index.poll_interval_ms must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

/// Load and validate config from an explicit file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config: Config = toml::from_str(&s).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    config.validate()?;
    Ok(config)
}

/// Load config from the app data directory, or defaults if no file is there.
pub fn load_default_config() -> Result<Config, ConfigError> {
    match default_config_path() {
        Some(path) if path.is_file() => load_config(&path),
        _ => Ok(Config::default()),
    }
}

/// Where `load_default_config` looks for `vecsync.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    app_data::app_data_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// API keys for the embedding and index services.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub pinecone_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("pinecone_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Resolve credentials through `lookup` (the CLI passes `std::env::var`).
    /// The OpenAI key is only required when OpenAI is the embedding provider.
    pub fn from_lookup(
        provider: ProviderKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let openai_api_key = match provider {
            ProviderKind::OpenAi => {
                Some(read(OPENAI_API_KEY_VAR).ok_or(ConfigError::MissingCredential(OPENAI_API_KEY_VAR))?)
            }
            ProviderKind::Ollama => read(OPENAI_API_KEY_VAR),
        };
        let pinecone_api_key =
            read(PINECONE_API_KEY_VAR).ok_or(ConfigError::MissingCredential(PINECONE_API_KEY_VAR))?;
        Ok(Self {
            openai_api_key,
            pinecone_api_key,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credential: set {0} in the environment")]
    MissingCredential(&'static str),
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

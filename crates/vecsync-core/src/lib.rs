//! All backend logic independent of how a sync is started.
//!
//! Documents are read from a folder, chunked, embedded, and written into a remote
//! vector index whose dimension matches the embedding model. The index service holds
//! all state; nothing is persisted locally apart from the optional config file
//! (see [app_data]).

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod ollama;
pub mod openai;
pub mod pinecone;
pub mod query;
pub mod readiness;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod store;
pub mod upsert;

#[cfg(test)]
mod testing;

pub use chunks::{chunk_documents, Chunk, Metadata};
pub use config::{load_config, load_default_config, Config, ConfigError, Credentials, ProviderKind};
pub use documents::{scan_documents, Document, ScanError};
pub use embeddings::{Embedder, EmbeddingError, EmbeddingProvider};
pub use index::{load_chunks, run_ingestion, IngestReport, PipelineError, Verification};
pub use ollama::OllamaEmbeddings;
pub use openai::OpenAiEmbeddings;
pub use pinecone::PineconeClient;
pub use query::{search, QueryError, SearchHit};
pub use readiness::{wait_ready, ReadinessError};
pub use reconcile::{reconcile, NameCandidates, Reconciliation};
pub use registry::{IndexDescriptor, IndexRegistry, IndexSpec, RegistryError};
pub use retry::{RetryPolicy, Retryable};
pub use store::{IndexError, QueryMatch, UpsertRecord, VectorIndex};
pub use upsert::{upsert_chunks, UpsertError, UpsertOptions, UpsertReport};

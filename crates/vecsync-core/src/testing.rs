//! In-memory stand-ins for the remote services, used by unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::registry::{IndexDescriptor, IndexRegistry, IndexSpec, RegistryError};
use crate::store::{IndexError, QueryMatch, UpsertRecord, VectorIndex};

#[derive(Debug, Default)]
struct FakeIndex {
    dimension: Option<usize>,
    records: BTreeMap<String, UpsertRecord>,
}

#[derive(Debug, Default)]
struct State {
    indexes: BTreeMap<String, FakeIndex>,
    /// Describe calls per index still answering "not ready".
    not_ready_polls: HashMap<String, usize>,
    fail_listing: bool,
    fail_describe: BTreeSet<String>,
    /// Describe calls that fail before answering normally.
    transient_describe_failures: usize,
    /// Every describe call takes this long before answering.
    describe_delay: Option<Duration>,
    fail_create: bool,
    /// Upsert call numbers (0-based) that fail with a 503.
    failing_upserts: BTreeSet<usize>,
    upsert_calls: usize,
    describe_calls: usize,
    created: Vec<IndexSpec>,
}

/// Registry and data plane backed by a map. Readiness, failures and call counts
/// are scriptable.
#[derive(Debug, Default)]
pub struct FakeIndexService {
    state: Mutex<State>,
}

impl FakeIndexService {
    pub fn new() -> Self {
        Self::default()
    }

    /// An existing, ready index.
    pub fn with_index(self, name: &str, dimension: Option<usize>) -> Self {
        self.state.lock().unwrap().indexes.insert(
            name.to_string(),
            FakeIndex {
                dimension,
                ..Default::default()
            },
        );
        self
    }

    /// `name` answers "not ready" to its first `polls` describes, whether it exists
    /// already or gets created later.
    pub fn with_ready_after(self, name: &str, polls: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .not_ready_polls
            .insert(name.to_string(), polls);
        self
    }

    pub fn never_ready(self, name: &str) -> Self {
        self.with_ready_after(name, usize::MAX)
    }

    pub fn slow_describe(self, delay: Duration) -> Self {
        self.state.lock().unwrap().describe_delay = Some(delay);
        self
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn fail_describe(&self, name: &str) {
        self.state.lock().unwrap().fail_describe.insert(name.to_string());
    }

    pub fn fail_next_describes(&self, n: usize) {
        self.state.lock().unwrap().transient_describe_failures = n;
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    pub fn fail_upsert_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.state.lock().unwrap().failing_upserts.extend(calls);
    }

    pub fn upsert_calls(&self) -> usize {
        self.state.lock().unwrap().upsert_calls
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }

    pub fn created(&self) -> Vec<IndexSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn record_ids(&self, index: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .indexes
            .get(index)
            .map(|i| i.records.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IndexRegistry for FakeIndexService {
    async fn list_index_names(&self) -> Result<BTreeSet<String>, RegistryError> {
        let s = self.state.lock().unwrap();
        if s.fail_listing {
            return Err(RegistryError::Request("listing unavailable".into()));
        }
        Ok(s.indexes.keys().cloned().collect())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescriptor, RegistryError> {
        let delay = {
            let mut s = self.state.lock().unwrap();
            s.describe_calls += 1;
            s.describe_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut guard = self.state.lock().unwrap();
        let s = &mut *guard;
        if s.transient_describe_failures > 0 {
            s.transient_describe_failures -= 1;
            return Err(RegistryError::Request("connection reset".into()));
        }
        if s.fail_describe.contains(name) {
            return Err(RegistryError::Status {
                status: 500,
                body: "describe failed".into(),
            });
        }
        let idx = s
            .indexes
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let ready = match s.not_ready_polls.get_mut(name) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        };
        Ok(IndexDescriptor {
            name: name.to_string(),
            dimension: idx.dimension,
            ready,
            metric: Some("cosine".into()),
            host: Some(format!("{name}.fake")),
        })
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), RegistryError> {
        let mut s = self.state.lock().unwrap();
        if s.fail_create {
            return Err(RegistryError::Status {
                status: 403,
                body: "quota exceeded".into(),
            });
        }
        if s.indexes.get(&spec.name).is_some_and(|i| i.dimension.is_some()) {
            return Err(RegistryError::AlreadyExists(spec.name.clone()));
        }
        s.created.push(spec.clone());
        let idx = s.indexes.entry(spec.name.clone()).or_default();
        idx.dimension = Some(spec.dimension);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FakeIndexService {
    async fn upsert(&self, index: &str, records: &[UpsertRecord]) -> Result<usize, IndexError> {
        let mut guard = self.state.lock().unwrap();
        let s = &mut *guard;
        let call = s.upsert_calls;
        s.upsert_calls += 1;
        if s.failing_upserts.remove(&call) {
            return Err(IndexError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let idx = s
            .indexes
            .get_mut(index)
            .ok_or_else(|| IndexError::MissingHost(index.to_string()))?;
        if let Some(r) = records.iter().find(|r| Some(r.values.len()) != idx.dimension) {
            return Err(IndexError::Status {
                status: 400,
                body: format!("vector {} has wrong dimension", r.id),
            });
        }
        for r in records {
            idx.records.insert(r.id.clone(), r.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        let s = self.state.lock().unwrap();
        let idx = s
            .indexes
            .get(index)
            .ok_or_else(|| IndexError::MissingHost(index.to_string()))?;
        let mut matches: Vec<QueryMatch> = idx
            .records
            .values()
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: r.values.iter().zip(vector).map(|(a, b)| a * b).sum(),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Hashes words into buckets so texts sharing words score higher together.
pub struct FakeEmbeddings {
    pub dimension: usize,
    pub max_batch: usize,
    calls: Mutex<usize>,
    failures: Mutex<HashMap<usize, fn() -> EmbeddingError>>,
}

impl FakeEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_batch: 16,
            calls: Mutex::new(0),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Makes call number `call` (0-based, queries and batches alike) fail.
    pub fn fail_call(self, call: usize, error: fn() -> EmbeddingError) -> Self {
        self.failures.lock().unwrap().insert(call, error);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn tick(&self) -> Result<(), EmbeddingError> {
        let mut calls = self.calls.lock().unwrap();
        let call = *calls;
        *calls += 1;
        match self.failures.lock().unwrap().remove(&call) {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h = (h ^ u64::from(b)).wrapping_mul(0x100000001b3);
            }
            v[(h % self.dimension as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.tick()?;
        Ok(self.vector(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.tick()?;
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn name(&self) -> &str {
        "fake"
    }
}

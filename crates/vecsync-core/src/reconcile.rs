//! Chooses the index a run writes into: the preferred name when it is missing or
//! has the embedding dimension, otherwise the first free or compatible `-vN` alternate.

use std::collections::BTreeSet;

use crate::registry::IndexRegistry;

/// Outcome of reconciling the preferred index name against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub target_name: String,
    pub must_create: bool,
}

/// State of one candidate name in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Free,
    Compatible,
    /// Exists with another dimension, or with one we could not read.
    Incompatible(Option<usize>),
}

/// `name`, `name-v2`, `name-v3`, ... without end.
#[derive(Debug, Clone)]
pub struct NameCandidates {
    base: String,
    next_version: u32,
}

impl NameCandidates {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            next_version: 1,
        }
    }

    pub fn next_name(&mut self) -> String {
        let version = self.next_version;
        self.next_version = self.next_version.saturating_add(1);
        if version == 1 {
            self.base.clone()
        } else {
            format!("{}-v{}", self.base, version)
        }
    }
}

impl Iterator for NameCandidates {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        Some(self.next_name())
    }
}

/// Picks the ingestion target for `desired` given the model's `dimension`.
///
/// Registry read failures never abort: a failed listing counts as an empty registry
/// and a failed describe counts as an unknown dimension, which is never treated as a
/// match. Every candidate that exists is in the listed snapshot, so at most
/// `snapshot.len() + 1` names are examined.
pub async fn reconcile(registry: &dyn IndexRegistry, desired: &str, dimension: usize) -> Reconciliation {
    let existing = match registry.list_index_names().await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!("unable to list indexes, treating registry as empty: {}", e);
            BTreeSet::new()
        }
    };
    tracing::info!("existing indexes: {:?}", existing);

    let mut candidates = NameCandidates::new(desired);
    loop {
        let name = candidates.next_name();
        match inspect(registry, &existing, &name, dimension).await {
            Candidate::Free => {
                return Reconciliation {
                    target_name: name,
                    must_create: true,
                };
            }
            Candidate::Compatible => {
                tracing::info!("reusing index {} (dimension {})", name, dimension);
                return Reconciliation {
                    target_name: name,
                    must_create: false,
                };
            }
            Candidate::Incompatible(Some(found)) => {
                tracing::warn!(
                    "dimension mismatch: index {} has {}, embeddings have {}; trying next name",
                    name,
                    found,
                    dimension
                );
            }
            Candidate::Incompatible(None) => {
                tracing::warn!(
                    "could not read dimension of index {}; trying next name to avoid a mismatch",
                    name
                );
            }
        }
    }
}

async fn inspect(
    registry: &dyn IndexRegistry,
    existing: &BTreeSet<String>,
    name: &str,
    dimension: usize,
) -> Candidate {
    if !existing.contains(name) {
        return Candidate::Free;
    }
    match registry.describe_index(name).await {
        Ok(d) if d.dimension == Some(dimension) => Candidate::Compatible,
        Ok(d) => Candidate::Incompatible(d.dimension),
        Err(e) => {
            tracing::warn!("unable to describe index {}: {}", name, e);
            Candidate::Incompatible(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeIndexService;

    #[test]
    fn candidates_count_up_from_v2() {
        let names: Vec<_> = NameCandidates::new("idx").take(4).collect();
        assert_eq!(names, ["idx", "idx-v2", "idx-v3", "idx-v4"]);
    }

    #[tokio::test]
    async fn missing_index_is_created_under_desired_name() {
        let svc = FakeIndexService::new();
        let r = reconcile(&svc, "tester-index", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "tester-index".into(), must_create: true });
    }

    #[tokio::test]
    async fn matching_dimension_is_reused() {
        let svc = FakeIndexService::new().with_index("tester-index", Some(1536));
        let r = reconcile(&svc, "tester-index", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "tester-index".into(), must_create: false });
    }

    #[tokio::test]
    async fn mismatched_dimension_moves_to_new_name() {
        for (existing, wanted) in [(768, 1536), (1536, 768), (3, 4)] {
            let svc = FakeIndexService::new().with_index("idx", Some(existing));
            let r = reconcile(&svc, "idx", wanted).await;
            assert_ne!(r.target_name, "idx");
            assert!(r.must_create);
        }
    }

    #[tokio::test]
    async fn unknown_dimension_is_not_assumed_compatible() {
        let svc = FakeIndexService::new().with_index("idx", None);
        let r = reconcile(&svc, "idx", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "idx-v2".into(), must_create: true });
    }

    #[tokio::test]
    async fn repeated_collisions_still_terminate() {
        let svc = FakeIndexService::new()
            .with_index("idx", Some(768))
            .with_index("idx-v2", Some(384))
            .with_index("idx-v3", None);
        let r = reconcile(&svc, "idx", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "idx-v4".into(), must_create: true });
    }

    #[tokio::test]
    async fn compatible_alternate_is_reused() {
        let svc = FakeIndexService::new()
            .with_index("idx", Some(768))
            .with_index("idx-v2", Some(1536));
        let r = reconcile(&svc, "idx", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "idx-v2".into(), must_create: false });
    }

    #[tokio::test]
    async fn list_failure_biases_toward_creation() {
        let svc = FakeIndexService::new().with_index("idx", Some(1536));
        svc.fail_listing();
        let r = reconcile(&svc, "idx", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "idx".into(), must_create: true });
    }

    #[tokio::test]
    async fn describe_failure_counts_as_unknown() {
        let svc = FakeIndexService::new().with_index("idx", Some(1536));
        svc.fail_describe("idx");
        let r = reconcile(&svc, "idx", 1536).await;
        assert_eq!(r, Reconciliation { target_name: "idx-v2".into(), must_create: true });
    }
}

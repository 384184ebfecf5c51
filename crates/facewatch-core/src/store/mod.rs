//! Enrollment store: label → reference embeddings, searchable through one of
//! two interchangeable backends.

pub mod indexed;
pub mod linear;

pub use indexed::{IndexArtifact, IndexError, IndexParams, IndexedBackend};
pub use linear::LinearBackend;

use crate::types::{Embedding, Identity, ScoredLabel};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One flattened (label, embedding) pair. Ordinal position in the flattened
/// list is what the index stores.
pub type Entry<'a> = (&'a str, &'a Embedding);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("identity label must not be empty")]
    EmptyLabel,
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("unknown identity: {0}")]
    UnknownLabel(String),
    #[error("identity {label} has {count} embeddings, index {index} is out of range")]
    EmbeddingOutOfRange {
        label: String,
        index: usize,
        count: usize,
    },
}

/// Which search backend a store uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Linear,
    Indexed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Linear => f.write_str("linear"),
            BackendKind::Indexed => f.write_str("indexed"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(BackendKind::Linear),
            "indexed" | "ivf" => Ok(BackendKind::Indexed),
            other => Err(format!("unknown backend {other:?} (expected linear or indexed)")),
        }
    }
}

/// The active search backend, chosen once when the store is created.
#[derive(Debug, Clone)]
pub enum Backend {
    Linear(LinearBackend),
    Indexed(IndexedBackend),
}

impl Backend {
    pub fn new(kind: BackendKind, params: IndexParams) -> Self {
        match kind {
            BackendKind::Linear => Backend::Linear(LinearBackend),
            BackendKind::Indexed => Backend::Indexed(IndexedBackend::new(params)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Linear(_) => BackendKind::Linear,
            Backend::Indexed(_) => BackendKind::Indexed,
        }
    }
}

/// Owns every enrolled identity.
///
/// Not internally synchronized: callers that share a store wrap it in a
/// reader/writer lock and treat [`rebuild_index`](Self::rebuild_index) as a
/// mutation.
#[derive(Debug, Clone)]
pub struct EnrollmentStore {
    identities: BTreeMap<String, Identity>,
    dimension: Option<usize>,
    backend: Backend,
}

impl EnrollmentStore {
    /// Create an empty store. `dimension` pre-fixes the embedding size;
    /// otherwise it is taken from the first inserted vector.
    pub fn new(backend: Backend, dimension: Option<usize>) -> Self {
        Self {
            identities: BTreeMap::new(),
            dimension,
            backend,
        }
    }

    pub fn linear() -> Self {
        Self::new(Backend::Linear(LinearBackend), None)
    }

    pub fn indexed(params: IndexParams) -> Self {
        Self::new(Backend::Indexed(IndexedBackend::new(params)), None)
    }

    /// Rebuild a store from persisted identities, re-checking every invariant.
    pub fn from_identities(
        backend: Backend,
        dimension: Option<usize>,
        identities: Vec<Identity>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(backend, dimension);
        for identity in identities {
            if identity.embeddings.is_empty() {
                return Err(StoreError::InvalidEmbedding(format!(
                    "identity {} has no embeddings",
                    identity.label
                )));
            }
            let Identity {
                label,
                info,
                embeddings,
                enrolled_at,
            } = identity;
            for embedding in embeddings {
                store.insert(&label, embedding)?;
            }
            if let Some(stored) = store.identities.get_mut(&label) {
                stored.info = info;
                stored.enrolled_at = enrolled_at;
            }
        }
        Ok(store)
    }

    /// Require `dimension` for every embedding. Fixes it on a store that has
    /// none yet; fails if the store already holds a different one.
    pub fn pin_dimension(&mut self, dimension: usize) -> Result<(), StoreError> {
        match self.dimension {
            Some(expected) if expected != dimension => Err(StoreError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                tracing::debug!(dimension, "store dimension pinned");
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    /// Check that `insert(label, embedding)` would succeed, without mutating.
    pub fn validate_insert(&self, label: &str, embedding: &Embedding) -> Result<(), StoreError> {
        if label.trim().is_empty() {
            return Err(StoreError::EmptyLabel);
        }
        if !embedding.is_well_formed() {
            return Err(StoreError::InvalidEmbedding(
                "embedding must be non-empty with finite components".into(),
            ));
        }
        match self.dimension {
            Some(expected) if expected != embedding.dimension() => Err(StoreError::DimensionMismatch {
                expected,
                actual: embedding.dimension(),
            }),
            _ => Ok(()),
        }
    }

    /// Add a reference embedding under `label`, creating the identity if needed.
    pub fn insert(&mut self, label: &str, embedding: Embedding) -> Result<(), StoreError> {
        self.validate_insert(label, &embedding)?;
        if self.dimension.is_none() {
            tracing::debug!(dimension = embedding.dimension(), "store dimension fixed");
            self.dimension = Some(embedding.dimension());
        }

        self.identities
            .entry(label.to_string())
            .or_insert_with(|| Identity {
                label: label.to_string(),
                info: None,
                embeddings: Vec::new(),
                enrolled_at: Utc::now(),
            })
            .embeddings
            .push(embedding);
        self.mark_dirty();
        Ok(())
    }

    /// Attach (or clear) free-text metadata for an enrolled identity.
    pub fn set_info(&mut self, label: &str, info: Option<String>) -> Result<(), StoreError> {
        let identity = self
            .identities
            .get_mut(label)
            .ok_or_else(|| StoreError::UnknownLabel(label.to_string()))?;
        identity.info = info.filter(|s| !s.trim().is_empty());
        Ok(())
    }

    /// Remove an identity. Removing an unknown label is a no-op returning `false`.
    pub fn remove(&mut self, label: &str) -> bool {
        let removed = self.identities.remove(label).is_some();
        if removed {
            self.mark_dirty();
        }
        removed
    }

    /// Remove one reference embedding. Removing the last one removes the
    /// identity; returns `true` in that case.
    pub fn remove_embedding(&mut self, label: &str, index: usize) -> Result<bool, StoreError> {
        let identity = self
            .identities
            .get_mut(label)
            .ok_or_else(|| StoreError::UnknownLabel(label.to_string()))?;
        if index >= identity.embeddings.len() {
            return Err(StoreError::EmbeddingOutOfRange {
                label: label.to_string(),
                index,
                count: identity.embeddings.len(),
            });
        }
        identity.embeddings.remove(index);
        let emptied = identity.embeddings.is_empty();
        if emptied {
            self.identities.remove(label);
        }
        self.mark_dirty();
        Ok(emptied)
    }

    pub fn get(&self, label: &str) -> Option<&Identity> {
        self.identities.get(label)
    }

    /// Identities in label order.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    /// Number of identities.
    pub fn size(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Total reference embeddings across all identities.
    pub fn embedding_count(&self) -> usize {
        self.identities.values().map(|i| i.embeddings.len()).sum()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// True when the indexed backend must be rebuilt before it can answer.
    pub fn needs_rebuild(&self) -> bool {
        match &self.backend {
            Backend::Linear(_) => false,
            Backend::Indexed(ix) => ix.is_stale(),
        }
    }

    /// Rebuild the index from the current identities. No-op for Linear.
    pub fn rebuild_index(&mut self) {
        let dimension = self.dimension.unwrap_or(0);
        let entries: Vec<Entry<'_>> = flatten(&self.identities);
        if let Backend::Indexed(ix) = &mut self.backend {
            ix.rebuild(dimension, &entries);
        }
    }

    /// Top-`k` labels by descending cosine similarity.
    ///
    /// An empty store yields an empty result. A stale index is bypassed with
    /// an exact scan so results are never computed from outdated data.
    pub fn query(&self, probe: &Embedding, k: usize) -> Result<Vec<ScoredLabel>, StoreError> {
        if let Some(expected) = self.dimension {
            if expected != probe.dimension() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: probe.dimension(),
                });
            }
        }
        if self.identities.is_empty() {
            return Ok(Vec::new());
        }

        let hits = match &self.backend {
            Backend::Linear(linear) => linear.search(&self.entries(), probe, k),
            Backend::Indexed(ix) => match ix.search(probe, k) {
                Some(hits) => hits,
                None => {
                    tracing::debug!("index stale; answering with exact scan");
                    LinearBackend.search(&self.entries(), probe, k)
                }
            },
        };
        Ok(hits)
    }

    /// Move the contents into a fresh store using `backend`.
    pub fn migrate(self, backend: Backend) -> EnrollmentStore {
        tracing::info!(
            from = %self.backend.kind(),
            to = %backend.kind(),
            identities = self.identities.len(),
            "migrating enrollment store"
        );
        let mut store = EnrollmentStore {
            identities: self.identities,
            dimension: self.dimension,
            backend,
        };
        store.mark_dirty();
        store
    }

    /// Flattened view in label order, embeddings in insertion order.
    pub fn entries(&self) -> Vec<Entry<'_>> {
        flatten(&self.identities)
    }

    /// Adopt a saved index artifact instead of rebuilding. No-op for Linear.
    pub fn restore_index(&mut self, artifact: IndexArtifact, labels: Vec<String>) -> Result<(), IndexError> {
        let dimension = self.dimension.unwrap_or(artifact.dimension);
        let entries = flatten(&self.identities);
        match &mut self.backend {
            Backend::Indexed(ix) => ix.restore(artifact, labels, dimension, &entries),
            Backend::Linear(_) => Ok(()),
        }
    }

    fn mark_dirty(&mut self) {
        if let Backend::Indexed(ix) = &mut self.backend {
            ix.mark_dirty();
        }
    }
}

fn flatten(identities: &BTreeMap<String, Identity>) -> Vec<Entry<'_>> {
    identities
        .values()
        .flat_map(|identity| {
            identity
                .embeddings
                .iter()
                .map(move |e| (identity.label.as_str(), e))
        })
        .collect()
}

/// Reduce scored hits to the best score per label, ordered by score
/// descending (label ascending on ties), truncated to `k`.
pub(crate) fn rank_by_label<'a>(hits: impl IntoIterator<Item = (&'a str, f32)>, k: usize) -> Vec<ScoredLabel> {
    if k == 0 {
        return Vec::new();
    }
    let mut best: HashMap<&str, f32> = HashMap::new();
    for (label, score) in hits {
        best.entry(label)
            .and_modify(|s| {
                if score > *s {
                    *s = score;
                }
            })
            .or_insert(score);
    }

    let mut ranked: Vec<ScoredLabel> = best
        .into_iter()
        .map(|(label, score)| ScoredLabel {
            label: label.to_string(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.label.cmp(&b.label)));
    ranked.truncate(k);
    ranked
}

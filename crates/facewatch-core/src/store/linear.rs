//! Exact brute-force backend.
//!
//! Keeps no derived state: every query flattens the enrolled identities and
//! scores the probe against every stored embedding. O(N·D) per query.

use super::{rank_by_label, Entry};
use crate::types::{cosine_similarity, Embedding, ScoredLabel};

/// Exhaustive cosine scan over the enrolled embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearBackend;

impl LinearBackend {
    /// Score `probe` against every entry and return the top-`k` labels.
    ///
    /// Always visits every entry; no early exit on a perfect score.
    pub fn search(&self, entries: &[Entry<'_>], probe: &Embedding, k: usize) -> Vec<ScoredLabel> {
        let hits = entries
            .iter()
            .map(|(label, embedding)| (*label, cosine_similarity(&probe.values, &embedding.values)));
        rank_by_label(hits, k)
    }
}

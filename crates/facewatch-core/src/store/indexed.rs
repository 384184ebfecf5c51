//! Approximate nearest-neighbour backend (IVF-flat).
//!
//! The flattened embedding set is partitioned by spherical k-means into
//! `nlist` inverted lists. A query ranks the centroids by cosine similarity,
//! scans the `nprobe` closest lists exactly and ranks what it found. With
//! `nprobe >= nlist` the search is exhaustive and therefore exact.
//!
//! The index has no incremental delete. Any mutation of the store marks it
//! dirty and the next maintenance step rebuilds it from scratch.

use super::{rank_by_label, Entry};
use crate::types::{cosine_similarity, Embedding, ScoredLabel};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// On-disk format version of [`IndexArtifact`].
pub const INDEX_FORMAT_VERSION: u32 = 1;

const DEFAULT_NPROBE: usize = 4;
const DEFAULT_KMEANS_ITERATIONS: usize = 10;
const DEFAULT_SEED: u64 = 42;

/// The index artifact cannot be used as-is. Always recoverable by rebuilding.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index artifact built for dimension {artifact}, store has {store}")]
    DimensionMismatch { artifact: usize, store: usize },
    #[error("index artifact is stale: fingerprint {found} does not match store {expected}")]
    Stale { expected: String, found: String },
    #[error("index artifact is inconsistent: {0}")]
    Corrupt(String),
}

/// Tuning knobs for the IVF index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Number of inverted lists; 0 picks ⌈√N⌉ at build time.
    pub nlist: usize,
    /// Lists scanned per query.
    pub nprobe: usize,
    pub kmeans_iterations: usize,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            nlist: 0,
            nprobe: DEFAULT_NPROBE,
            kmeans_iterations: DEFAULT_KMEANS_ITERATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

impl IndexParams {
    fn effective_nlist(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let wanted = if self.nlist == 0 {
            (n as f64).sqrt().ceil() as usize
        } else {
            self.nlist
        };
        wanted.clamp(1, n)
    }
}

/// Serialized form of a built index.
///
/// Ordinals in `lists` refer to positions in the flattened mapping; the
/// parallel label table travels separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexArtifact {
    pub format_version: u32,
    pub dimension: usize,
    /// SHA-256 over the flattened mapping the index was built from.
    pub fingerprint: String,
    pub centroids: Vec<Vec<f32>>,
    pub lists: Vec<Vec<u32>>,
}

#[derive(Debug, Clone)]
struct IvfIndex {
    dimension: usize,
    fingerprint: String,
    /// Unit-length centroids.
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<u32>>,
    labels: Vec<String>,
    vectors: Vec<Embedding>,
}

/// IVF-flat backend with lazy rebuild.
#[derive(Debug, Clone)]
pub struct IndexedBackend {
    params: IndexParams,
    index: Option<IvfIndex>,
    dirty: bool,
}

impl IndexedBackend {
    pub fn new(params: IndexParams) -> Self {
        Self {
            params,
            index: None,
            dirty: true,
        }
    }

    pub fn params(&self) -> IndexParams {
        self.params
    }

    /// Invalidate the index; it is rebuilt before the next indexed search.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_stale(&self) -> bool {
        self.dirty || self.index.is_none()
    }

    /// Number of inverted lists in the current index (0 if never built).
    pub fn list_count(&self) -> usize {
        self.index.as_ref().map_or(0, |ix| ix.lists.len())
    }

    /// Rebuild the index from the flattened mapping.
    pub fn rebuild(&mut self, dimension: usize, entries: &[Entry<'_>]) {
        let started = std::time::Instant::now();
        let index = build_ivf(&self.params, dimension, entries);
        tracing::info!(
            vectors = entries.len(),
            lists = index.lists.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ivf index rebuilt"
        );
        self.index = Some(index);
        self.dirty = false;
    }

    /// Approximate top-`k` search. Returns `None` when the index is stale.
    pub fn search(&self, probe: &Embedding, k: usize) -> Option<Vec<ScoredLabel>> {
        if self.dirty {
            return None;
        }
        let index = self.index.as_ref()?;

        let unit = probe.normalized();
        let mut order: Vec<(usize, f32)> = index
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, dot(&unit.values, c)))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));

        let nprobe = self.params.nprobe.max(1);
        let hits = order
            .iter()
            .take(nprobe)
            .flat_map(|(list, _)| index.lists[*list].iter())
            .map(|&ordinal| {
                let ordinal = ordinal as usize;
                (
                    index.labels[ordinal].as_str(),
                    cosine_similarity(&probe.values, &index.vectors[ordinal].values),
                )
            });
        Some(rank_by_label(hits, k))
    }

    /// Export the current index and its label table, if it is fresh.
    pub fn artifact(&self) -> Option<(IndexArtifact, Vec<String>)> {
        if self.dirty {
            return None;
        }
        let index = self.index.as_ref()?;
        let artifact = IndexArtifact {
            format_version: INDEX_FORMAT_VERSION,
            dimension: index.dimension,
            fingerprint: index.fingerprint.clone(),
            centroids: index.centroids.clone(),
            lists: index.lists.clone(),
        };
        Some((artifact, index.labels.clone()))
    }

    /// Adopt a previously saved index after checking it against the mapping.
    pub fn restore(
        &mut self,
        artifact: IndexArtifact,
        labels: Vec<String>,
        dimension: usize,
        entries: &[Entry<'_>],
    ) -> Result<(), IndexError> {
        if artifact.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                artifact.format_version
            )));
        }
        if artifact.dimension != dimension {
            return Err(IndexError::DimensionMismatch {
                artifact: artifact.dimension,
                store: dimension,
            });
        }
        let expected = fingerprint(entries);
        if artifact.fingerprint != expected {
            return Err(IndexError::Stale {
                expected,
                found: artifact.fingerprint,
            });
        }
        if labels.len() != entries.len()
            || labels.iter().zip(entries).any(|(l, (label, _))| l.as_str() != *label)
        {
            return Err(IndexError::Corrupt(
                "label table does not match the mapping".into(),
            ));
        }
        if artifact.lists.len() != artifact.centroids.len() {
            return Err(IndexError::Corrupt(format!(
                "{} lists for {} centroids",
                artifact.lists.len(),
                artifact.centroids.len()
            )));
        }
        if artifact.centroids.iter().any(|c| c.len() != dimension) {
            return Err(IndexError::Corrupt("centroid dimension mismatch".into()));
        }

        let mut seen = vec![false; entries.len()];
        for &ordinal in artifact.lists.iter().flatten() {
            match seen.get_mut(ordinal as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(IndexError::Corrupt(format!("ordinal {ordinal} listed twice")))
                }
                None => return Err(IndexError::Corrupt(format!("ordinal {ordinal} out of range"))),
            }
        }
        if seen.iter().any(|s| !s) {
            return Err(IndexError::Corrupt("index does not cover every embedding".into()));
        }

        self.index = Some(IvfIndex {
            dimension,
            fingerprint: artifact.fingerprint,
            centroids: artifact.centroids,
            lists: artifact.lists,
            labels,
            vectors: entries.iter().map(|(_, e)| (*e).clone()).collect(),
        });
        self.dirty = false;
        Ok(())
    }
}

/// SHA-256 fingerprint of the flattened mapping (labels and raw vector bits).
pub fn fingerprint(entries: &[Entry<'_>]) -> String {
    let mut hasher = Sha256::new();
    for (label, embedding) in entries {
        hasher.update(label.as_bytes());
        hasher.update([0u8]);
        hasher.update((embedding.values.len() as u64).to_le_bytes());
        for v in &embedding.values {
            hasher.update(v.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

fn build_ivf(params: &IndexParams, dimension: usize, entries: &[Entry<'_>]) -> IvfIndex {
    let units: Vec<Vec<f32>> = entries.iter().map(|(_, e)| e.normalized().values).collect();
    let nlist = params.effective_nlist(units.len());

    let centroids = if nlist == 0 {
        Vec::new()
    } else {
        let init = kmeans_plus_plus_init(&units, nlist, params.seed);
        spherical_kmeans(&units, init, params.kmeans_iterations)
    };

    let mut lists: Vec<Vec<u32>> = vec![Vec::new(); centroids.len()];
    for (ordinal, unit) in units.iter().enumerate() {
        let list = nearest_centroid(unit, &centroids);
        lists[list].push(ordinal as u32);
    }

    IvfIndex {
        dimension,
        fingerprint: fingerprint(entries),
        centroids,
        lists,
        labels: entries.iter().map(|(l, _)| (*l).to_string()).collect(),
        vectors: entries.iter().map(|(_, e)| (*e).clone()).collect(),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine distance between unit vectors, floored at zero.
fn unit_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - dot(a, b)).max(0.0)
}

fn normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// K-means++ seeding. May return fewer than `k` centroids when the data has
/// fewer distinct directions.
fn kmeans_plus_plus_init(units: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    if units.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids = Vec::with_capacity(k);
    centroids.push(units[rng.gen_range(0..units.len())].clone());

    for _ in 1..k {
        let weights: Vec<f32> = units
            .iter()
            .map(|u| {
                let d = centroids
                    .iter()
                    .map(|c| unit_distance(u, c))
                    .fold(f32::MAX, f32::min);
                d * d
            })
            .collect();

        let total: f32 = weights.iter().sum();
        if !(total > 0.0) {
            break;
        }

        // Roulette wheel selection
        let target = rng.gen_range(0.0..total);
        let mut cumsum = 0.0;
        let mut selected = units.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            cumsum += w;
            if cumsum >= target && *w > 0.0 {
                selected = i;
                break;
            }
        }
        centroids.push(units[selected].clone());
    }

    centroids
}

fn nearest_centroid(unit: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_sim = f32::NEG_INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let sim = dot(unit, c);
        if sim > best_sim {
            best_sim = sim;
            best = i;
        }
    }
    best
}

/// Lloyd iterations with centroids re-projected onto the unit sphere.
fn spherical_kmeans(units: &[Vec<f32>], mut centroids: Vec<Vec<f32>>, iterations: usize) -> Vec<Vec<f32>> {
    let dimension = units.first().map_or(0, Vec::len);

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0f32; dimension]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];

        for unit in units {
            let cluster = nearest_centroid(unit, &centroids);
            for (s, v) in sums[cluster].iter_mut().zip(unit) {
                *s += v;
            }
            counts[cluster] += 1;
        }

        let mut moved = false;
        for ((centroid, mut sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // Empty clusters keep their previous centroid.
            if count == 0 {
                continue;
            }
            normalize_in_place(&mut sum);
            if sum.iter().all(|x| *x == 0.0) {
                continue;
            }
            if *centroid != sum {
                moved = true;
                *centroid = sum;
            }
        }
        if !moved {
            break;
        }
    }

    centroids
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Face embedding vector (typically 512-dimensional for ArcFace-family models).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value clamped to [-1, 1]. Higher = more similar.
    /// A zero-norm operand yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.values, &other.values)
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.norm_f64() as f32
    }

    fn norm_f64(&self) -> f64 {
        self.values
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }

    /// Unit-length copy of this embedding; zero vectors are returned unchanged.
    pub fn normalized(&self) -> Embedding {
        let norm = self.norm_f64();
        if norm > 0.0 {
            Embedding::new(self.values.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
        } else {
            self.clone()
        }
    }

    /// True if the vector is non-empty and every component is finite.
    pub fn is_well_formed(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Cosine similarity over raw slices.
///
/// Always processes all dimensions. Both store backends score through this
/// function so their results are directly comparable.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    // f64 accumulators: f32 squares overflow near 1e19 and underflow near 1e-23.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    let sim = if denom > 0.0 { dot / denom } else { 0.0 };
    if sim.is_nan() {
        0.0
    } else {
        sim.clamp(-1.0, 1.0) as f32
    }
}

/// An enrolled identity: a unique label plus one or more reference embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub label: String,
    /// Free-text metadata (e.g. case notes); also checked by the watchlist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub embeddings: Vec<Embedding>,
    pub enrolled_at: DateTime<Utc>,
}

/// One ranked candidate returned by a store query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    /// Cosine similarity of the best embedding for this label [-1, 1].
    pub score: f32,
}

/// Outcome of identifying one probe embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Label of the matched identity (only set when `matched`).
    pub label: Option<String>,
    /// Similarity of the top candidate, or the detection score when the
    /// detection gate rejected the face.
    pub score: f32,
    pub matched: bool,
    /// Set only when `matched` and the label/info hit the watchlist.
    pub alert: bool,
    /// Metadata of the matched identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Ranked candidates, best first.
    #[serde(default)]
    pub top_matches: Vec<ScoredLabel>,
}

impl Decision {
    /// A non-match carrying the given score.
    pub fn unknown(score: f32) -> Self {
        Self {
            label: None,
            score,
            matched: false,
            alert: false,
            info: None,
            top_matches: Vec::new(),
        }
    }
}

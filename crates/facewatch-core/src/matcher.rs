//! Best-match decision over an enrollment store.

use crate::store::EnrollmentStore;
use crate::types::{Decision, Embedding};
use serde::{Deserialize, Serialize};

/// Independent gates for one identification.
///
/// `detection` decides whether the region is a face at all; `recognition`
/// decides whether the face is a known one. Both comparisons are `>=`: a
/// score exactly at a threshold passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub detection: f32,
    pub recognition: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            detection: 0.5,
            recognition: 0.4,
        }
    }
}

/// Backend-agnostic matcher.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    thresholds: Thresholds,
    top_k: usize,
}

impl Matcher {
    /// `top_k` bounds how many ranked candidates are reported; at least one
    /// is always requested.
    pub fn new(thresholds: Thresholds, top_k: usize) -> Self {
        Self {
            thresholds,
            top_k: top_k.max(1),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Detection gate. NaN never passes.
    pub fn passes_detection(&self, detection_score: f32) -> bool {
        detection_score >= self.thresholds.detection
    }

    /// Decide whether `embedding` belongs to an enrolled identity.
    ///
    /// Never fails: an undetected face, an empty store, or a probe the store
    /// cannot score all come back as a non-match.
    pub fn identify(&self, store: &EnrollmentStore, embedding: &Embedding, detection_score: f32) -> Decision {
        if !self.passes_detection(detection_score) {
            tracing::debug!(
                detection_score,
                threshold = self.thresholds.detection,
                "face below detection threshold; skipping recognition"
            );
            return Decision::unknown(detection_score);
        }

        let candidates = match store.query(embedding, self.top_k) {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(error = %err, "probe rejected by store; treating as unknown");
                return Decision::unknown(0.0);
            }
        };

        let Some(best) = candidates.first() else {
            return Decision::unknown(0.0);
        };

        let score = best.score;
        if score < self.thresholds.recognition {
            return Decision {
                top_matches: candidates,
                ..Decision::unknown(score)
            };
        }

        let label = best.label.clone();
        tracing::debug!(label = %label, score, "identity matched");
        Decision {
            info: store.get(&label).and_then(|i| i.info.clone()),
            label: Some(label),
            score,
            matched: true,
            alert: false,
            top_matches: candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexParams;

    fn e(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn store() -> EnrollmentStore {
        let mut store = EnrollmentStore::linear();
        store.insert("alice", e(&[1.0, 0.0, 0.0])).unwrap();
        store.insert("bob", e(&[0.0, 1.0, 0.0])).unwrap();
        store.set_info("bob", Some("night shift".into())).unwrap();
        store
    }

    fn matcher(detection: f32, recognition: f32) -> Matcher {
        Matcher::new(Thresholds { detection, recognition }, 3)
    }

    #[test]
    fn test_detection_gate_skips_recognition() {
        let m = matcher(0.5, 0.4);
        let d = m.identify(&store(), &e(&[1.0, 0.0, 0.0]), 0.3);
        assert!(!d.matched);
        assert!(!d.alert);
        assert!(d.label.is_none());
        assert_eq!(d.score, 0.3);
        assert!(d.top_matches.is_empty());
    }

    #[test]
    fn test_detection_gate_nan() {
        let m = matcher(0.5, 0.4);
        assert!(!m.identify(&store(), &e(&[1.0, 0.0, 0.0]), f32::NAN).matched);
    }

    #[test]
    fn test_detection_threshold_inclusive() {
        let m = matcher(0.5, 0.4);
        assert!(m.identify(&store(), &e(&[1.0, 0.0, 0.0]), 0.5).matched);
    }

    #[test]
    fn test_match_reports_label_score_info() {
        let m = matcher(0.5, 0.4);
        let d = m.identify(&store(), &e(&[0.1, 1.0, 0.0]), 0.9);
        assert!(d.matched);
        assert_eq!(d.label.as_deref(), Some("bob"));
        assert_eq!(d.info.as_deref(), Some("night shift"));
        assert!(d.score > 0.99);
        assert_eq!(d.top_matches.len(), 2);
        assert_eq!(d.top_matches[0].label, "bob");
    }

    #[test]
    fn test_recognition_threshold_boundary() {
        let s = store();
        let probe = e(&[0.6, 0.8, 0.0]);
        let score = s.query(&probe, 1).unwrap()[0].score;

        let at = matcher(0.5, score);
        assert!(at.identify(&s, &probe, 0.9).matched, "tie at threshold matches");

        let above = matcher(0.5, f32::from_bits(score.to_bits() + 1));
        let d = above.identify(&s, &probe, 0.9);
        assert!(!d.matched, "one ulp below threshold does not match");
        assert_eq!(d.score, score);
        assert!(d.label.is_none());
        assert_eq!(d.top_matches[0].label, "bob");
    }

    #[test]
    fn test_empty_store_never_matches() {
        let m = matcher(0.0, -1.0);
        for s in [EnrollmentStore::linear(), EnrollmentStore::indexed(IndexParams::default())] {
            let d = m.identify(&s, &e(&[1.0, 0.0]), 1.0);
            assert!(!d.matched);
            assert!(!d.alert);
        }
    }

    #[test]
    fn test_wrong_dimension_probe_is_unknown() {
        let m = matcher(0.5, 0.4);
        let d = m.identify(&store(), &e(&[1.0, 0.0]), 0.9);
        assert!(!d.matched);
        assert_eq!(d.score, 0.0);
    }

    #[test]
    fn test_top_k_floor() {
        let m = Matcher::new(Thresholds::default(), 0);
        let d = m.identify(&store(), &e(&[1.0, 0.0, 0.0]), 0.9);
        assert!(d.matched);
        assert_eq!(d.top_matches.len(), 1);
    }
}

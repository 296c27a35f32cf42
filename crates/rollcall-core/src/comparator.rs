//! Similarity scoring: Euclidean distance mapped to a bounded [0, 1] score.

use crate::types::{Descriptor, FaceProfile, ShapeMismatch};

/// Calibration constant: the descriptor distance that maps to similarity 0.
/// Matches the enrollment client, which scores with the same constant.
pub const DEFAULT_MAX_DISTANCE: f32 = 0.6;

/// Best-scoring profile from a gallery comparison.
#[derive(Debug, Clone)]
pub struct GalleryMatch {
    pub score: f32,
    pub profile_id: String,
    pub profile_label: String,
    pub user: String,
}

/// Converts descriptor distances into similarity scores.
///
/// `score = max(0, 1 - distance / max_distance)`, so identical descriptors
/// score 1.0 and anything at or beyond `max_distance` scores 0.0. The score
/// is monotonically non-increasing in distance.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityComparator {
    max_distance: f32,
}

impl Default for SimilarityComparator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTANCE)
    }
}

impl SimilarityComparator {
    /// `max_distance` must be positive; a zero divisor would make the score
    /// undefined.
    pub fn new(max_distance: f32) -> Self {
        debug_assert!(max_distance > 0.0, "max_distance must be positive");
        Self { max_distance }
    }

    /// Similarity between a stored and a live descriptor, in [0, 1].
    pub fn score(&self, stored: &Descriptor, live: &Descriptor) -> Result<f32, ShapeMismatch> {
        let distance = stored.distance(live)?;
        Ok((1.0 - distance / self.max_distance).clamp(0.0, 1.0))
    }

    /// Score a probe against every profile in a gallery; highest score wins.
    ///
    /// Always scores the full gallery, no early exit on a passing hit — the
    /// best profile is wanted, not the first acceptable one.
    pub fn best_match(
        &self,
        probe: &Descriptor,
        gallery: &[FaceProfile],
    ) -> Result<Option<GalleryMatch>, ShapeMismatch> {
        let mut best: Option<GalleryMatch> = None;

        for profile in gallery {
            let score = self.score(&profile.descriptor, probe)?;
            let is_better = best.as_ref().map(|b| score > b.score).unwrap_or(true);
            if is_better {
                best = Some(GalleryMatch {
                    score,
                    profile_id: profile.id.clone(),
                    profile_label: profile.label.clone(),
                    user: profile.user.clone(),
                });
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(values: Vec<f32>) -> Descriptor {
        Descriptor {
            values,
            model_version: None,
        }
    }

    fn profile(id: &str, user: &str, label: &str, values: Vec<f32>) -> FaceProfile {
        FaceProfile {
            id: id.into(),
            user: user.into(),
            label: label.into(),
            descriptor: desc(values),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_identical_descriptors_score_one() {
        let cmp = SimilarityComparator::default();
        let a = desc(vec![0.3, 0.1, -0.2]);
        assert_eq!(cmp.score(&a, &a.clone()).unwrap(), 1.0);
    }

    #[test]
    fn test_distance_at_max_scores_zero() {
        let cmp = SimilarityComparator::new(0.6);
        let a = desc(vec![0.0]);
        let b = desc(vec![0.6]);
        assert_eq!(cmp.score(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_beyond_max_clamps_to_zero() {
        let cmp = SimilarityComparator::new(0.6);
        let a = desc(vec![0.0]);
        let b = desc(vec![5.0]);
        assert_eq!(cmp.score(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_known_calibration_points() {
        // distance 0.3 at max 0.6 → 0.5; distance 0.1 → ~0.833
        let cmp = SimilarityComparator::new(0.6);
        let a = desc(vec![0.0]);
        assert!((cmp.score(&a, &desc(vec![0.3])).unwrap() - 0.5).abs() < 1e-6);
        assert!((cmp.score(&a, &desc(vec![0.1])).unwrap() - 0.833_333).abs() < 1e-4);
    }

    #[test]
    fn test_score_monotonically_non_increasing_in_distance() {
        let cmp = SimilarityComparator::default();
        let origin = desc(vec![0.0, 0.0]);
        let mut prev = f32::INFINITY;
        for step in 0..20 {
            let d = step as f32 * 0.05;
            let s = cmp.score(&origin, &desc(vec![d, 0.0])).unwrap();
            assert!(s <= prev, "score rose from {prev} to {s} at distance {d}");
            prev = s;
        }
    }

    #[test]
    fn test_score_shape_mismatch() {
        let cmp = SimilarityComparator::default();
        let a = desc(vec![0.0, 0.0]);
        let b = desc(vec![0.0]);
        assert!(cmp.score(&a, &b).is_err());
    }

    #[test]
    fn test_best_match_scores_whole_gallery() {
        // Best entry is last: proves no early exit on the first passing score.
        let cmp = SimilarityComparator::default();
        let probe = desc(vec![0.0, 0.0]);
        let gallery = vec![
            profile("1", "ana", "normal", vec![0.2, 0.0]),
            profile("2", "ana", "glasses", vec![0.5, 0.0]),
            profile("3", "ana", "hat", vec![0.05, 0.0]),
        ];

        let best = cmp.best_match(&probe, &gallery).unwrap().unwrap();
        assert_eq!(best.profile_id, "3");
        assert_eq!(best.profile_label, "hat");
    }

    #[test]
    fn test_best_match_empty_gallery() {
        let cmp = SimilarityComparator::default();
        let probe = desc(vec![0.0]);
        assert!(cmp.best_match(&probe, &[]).unwrap().is_none());
    }

    #[test]
    fn test_best_match_propagates_shape_mismatch() {
        let cmp = SimilarityComparator::default();
        let probe = desc(vec![0.0, 0.0]);
        let gallery = vec![profile("1", "ana", "normal", vec![0.2])];
        assert!(cmp.best_match(&probe, &gallery).is_err());
    }
}

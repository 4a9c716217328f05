//! Weighted combination of signal scores into one calibrated confidence.

use crate::profiles::SignalWeights;

/// Confidence cut points shared by the pipeline and the review queue.
///
/// Detection confidence is calibrated once, here, and consumed in two
/// places: the ingest pipeline compares against [`AUTO_APPROVE`] to decide
/// whether a file needs a human, and queue statistics bucket pending items
/// at [`LOW_CONFIDENCE`]. Items at or above `AUTO_APPROVE` never reach the
/// queue as pending work.
///
/// [`AUTO_APPROVE`]: detection_thresholds::AUTO_APPROVE
/// [`LOW_CONFIDENCE`]: detection_thresholds::LOW_CONFIDENCE
pub mod detection_thresholds {
    /// At or above this, an item is approved without review (closed bound).
    pub const AUTO_APPROVE: f32 = 0.75;

    /// Below this, a pending item counts as low confidence in queue stats.
    pub const LOW_CONFIDENCE: f32 = 0.5;
}

/// Weighted average of the three signal scores, clamped to [0, 1].
///
/// Weights come from the profile. A zero weight removes that signal from
/// the average entirely, so profiles without free text can opt out of the
/// keyword signal without being penalized for it.
pub fn combine(weights: &SignalWeights, filename: f32, structural: f32, keyword: f32) -> f32 {
    let total = weights.sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted =
        weights.filename * filename + weights.structural * structural + weights.keyword * keyword;
    (weighted / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_blend_as_documented() {
        // 0.1 * 1.0 + 0.6 * 0.8 + 0.3 * 0.4 = 0.70
        let confidence = combine(&SignalWeights::default(), 1.0, 0.8, 0.4);
        assert!((confidence - 0.70).abs() < 0.01);
    }

    #[test]
    fn perfect_signals_yield_one() {
        assert_eq!(combine(&SignalWeights::default(), 1.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn absent_signals_yield_zero() {
        assert_eq!(combine(&SignalWeights::default(), 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn zero_keyword_weight_ignores_keyword_score() {
        let weights = SignalWeights {
            filename: 0.25,
            structural: 0.75,
            keyword: 0.0,
        };
        let with_hits = combine(&weights, 1.0, 1.0, 1.0);
        let without = combine(&weights, 1.0, 1.0, 0.0);
        assert_eq!(with_hits, without);
    }

    #[test]
    fn unnormalized_weights_are_renormalized() {
        let weights = SignalWeights {
            filename: 1.0,
            structural: 1.0,
            keyword: 2.0,
        };
        let confidence = combine(&weights, 1.0, 1.0, 0.0);
        assert!((confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_all_zero_weights_score_zero() {
        let weights = SignalWeights {
            filename: 0.0,
            structural: 0.0,
            keyword: 0.0,
        };
        assert_eq!(combine(&weights, 1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn thresholds_are_ordered_within_unit_interval() {
        use super::detection_thresholds::{AUTO_APPROVE, LOW_CONFIDENCE};
        assert!(0.0 < LOW_CONFIDENCE);
        assert!(LOW_CONFIDENCE < AUTO_APPROVE);
        assert!(AUTO_APPROVE < 1.0);
    }
}

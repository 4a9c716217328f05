//! Structure detection: decide which case profile a parsed tree follows.
//!
//! Every registered profile is scored on three signals (filename pattern,
//! weighted field presence, vocabulary overlap), the signals are blended
//! with the profile's own weights, and the best-scoring profile wins. The
//! whole pass is a pure function of the tree and the registry, so the same
//! file always produces the same result.

pub mod confidence;
pub mod signals;

pub use confidence::{combine, detection_thresholds};
pub use signals::{filename_signal, keyword_signal, structural_signal, StructuralScore};

use tracing::debug;

use crate::models::{
    DetectionResult, SignalEvidence, SignalKind, DETECTOR_VERSION, METHOD_WEIGHTED_SIGNALS,
};
use crate::profiles::{CaseProfile, ProfileRegistry};

/// Candidates below this confidence are reported as no-match unless the
/// caller configures a different floor.
pub const DEFAULT_DETECTION_FLOOR: f32 = 0.30;

struct Candidate<'a> {
    profile: &'a CaseProfile,
    confidence: f32,
    filename_score: f32,
    structural: StructuralScore,
    keyword_score: f32,
}

fn score_profile<'a>(
    tree: &crate::models::RawTree,
    profile: &'a CaseProfile,
) -> Candidate<'a> {
    let filename_score = filename_signal(&tree.filename, profile);
    let structural = structural_signal(tree, profile);
    let keyword_score = keyword_signal(tree, profile);
    let confidence = combine(
        &profile.weights,
        filename_score,
        structural.score,
        keyword_score,
    );
    Candidate {
        profile,
        confidence,
        filename_score,
        structural,
        keyword_score,
    }
}

/// Score every profile in the registry and return the detection outcome.
///
/// Ties on confidence fall back to the structural score; a further tie
/// keeps the earlier-declared profile. Results under `floor` collapse to
/// a no-match with zero confidence.
pub fn detect_case(
    tree: &crate::models::RawTree,
    registry: &ProfileRegistry,
    floor: f32,
) -> DetectionResult {
    let mut best: Option<Candidate> = None;
    for profile in registry.iter() {
        let candidate = score_profile(tree, profile);
        debug!(
            profile_id = %candidate.profile.profile_id,
            confidence = candidate.confidence,
            structural = candidate.structural.score,
            "scored profile"
        );
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let wins = candidate.confidence > current.confidence
                    || (candidate.confidence == current.confidence
                        && candidate.structural.score > current.structural.score);
                if wins {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }

    let Some(winner) = best else {
        return DetectionResult::no_match();
    };
    if winner.confidence < floor {
        debug!(
            filename = %tree.filename,
            best_profile = %winner.profile.profile_id,
            confidence = winner.confidence,
            floor,
            "best candidate under detection floor"
        );
        return DetectionResult::no_match();
    }

    let weights = &winner.profile.weights;
    DetectionResult {
        case_id: Some(winner.profile.profile_id.clone()),
        confidence: winner.confidence,
        evidence: vec![
            SignalEvidence {
                signal: SignalKind::Filename,
                weight: weights.filename,
                score: winner.filename_score,
                matched: winner.filename_score >= 1.0,
            },
            SignalEvidence {
                signal: SignalKind::Structural,
                weight: weights.structural,
                score: winner.structural.score,
                matched: winner.structural.score > 0.0,
            },
            SignalEvidence {
                signal: SignalKind::Keyword,
                weight: weights.keyword,
                score: winner.keyword_score,
                matched: winner.keyword_score > 0.0,
            },
        ],
        method: METHOD_WEIGHTED_SIGNALS.to_string(),
        detector_version: DETECTOR_VERSION.to_string(),
        matched_fields: winner.structural.matched_fields,
        missing_fields: winner.structural.missing_fields,
        match_percentage: winner.structural.match_percentage,
        failure_reason: None,
    }
}

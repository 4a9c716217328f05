//! Detection results: which case a file follows and why.

use serde::{Deserialize, Serialize};

use super::enums::SignalKind;

pub const DETECTOR_VERSION: &str = "1.0.0";

/// Detection method labels stored with each result.
pub const METHOD_WEIGHTED_SIGNALS: &str = "weighted_signals";
pub const METHOD_UNPARSEABLE: &str = "unparseable";

/// One scored signal for the winning profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvidence {
    pub signal: SignalKind,
    /// Configured weight from the profile, not learned.
    pub weight: f32,
    /// Raw signal score in [0, 1] before weighting.
    pub score: f32,
    pub matched: bool,
}

/// Outcome of structure detection for one file.
///
/// Pure function of the input tree and the registry: identical inputs yield
/// identical results. `matched_fields`/`missing_fields`/`match_percentage`
/// describe the winning profile's expected paths so a reviewer can see what
/// the detector saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub case_id: Option<String>,
    pub confidence: f32,
    pub evidence: Vec<SignalEvidence>,
    pub method: String,
    pub detector_version: String,
    pub matched_fields: Vec<String>,
    pub missing_fields: Vec<String>,
    pub match_percentage: f32,
    /// Set only for unparseable input.
    pub failure_reason: Option<String>,
}

impl DetectionResult {
    /// No profile cleared the floor.
    pub fn no_match() -> Self {
        Self {
            case_id: None,
            confidence: 0.0,
            evidence: Vec::new(),
            method: METHOD_WEIGHTED_SIGNALS.to_string(),
            detector_version: DETECTOR_VERSION.to_string(),
            matched_fields: Vec::new(),
            missing_fields: Vec::new(),
            match_percentage: 0.0,
            failure_reason: None,
        }
    }

    /// The tree reader could not produce a tree. Kept distinct from a
    /// low-confidence match so review sees the difference.
    pub fn unparseable(reason: impl Into<String>) -> Self {
        Self {
            case_id: None,
            confidence: 0.0,
            evidence: Vec::new(),
            method: METHOD_UNPARSEABLE.to_string(),
            detector_version: DETECTOR_VERSION.to_string(),
            matched_fields: Vec::new(),
            missing_fields: Vec::new(),
            match_percentage: 0.0,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_unparseable(&self) -> bool {
        self.method == METHOD_UNPARSEABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_has_zero_confidence_and_no_case() {
        let result = DetectionResult::no_match();
        assert!(result.case_id.is_none());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, METHOD_WEIGHTED_SIGNALS);
        assert!(!result.is_unparseable());
    }

    #[test]
    fn unparseable_is_distinct_from_no_match() {
        let result = DetectionResult::unparseable("unexpected EOF at byte 14");
        assert!(result.is_unparseable());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(
            result.failure_reason.as_deref(),
            Some("unexpected EOF at byte 14")
        );
    }

    #[test]
    fn result_round_trips_through_json() {
        let result = DetectionResult {
            case_id: Some("lidc_single_session".into()),
            confidence: 0.82,
            evidence: vec![SignalEvidence {
                signal: SignalKind::Structural,
                weight: 0.6,
                score: 0.9,
                matched: true,
            }],
            method: METHOD_WEIGHTED_SIGNALS.into(),
            detector_version: DETECTOR_VERSION.into(),
            matched_fields: vec!["ResponseHeader/StudyInstanceUID".into()],
            missing_fields: vec![],
            match_percentage: 90.0,
            failure_reason: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"structural\""));
        let back: DetectionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}

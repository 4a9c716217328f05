//! Case profiles: versioned reference data describing each structural
//! convention ("parse case") the detector can recognize.
//!
//! Weights and expected fields are data, not code, so detection is testable
//! with fixed inputs and exact expected outputs.

pub mod registry;

pub use registry::ProfileRegistry;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{FieldValue, SegmentKind, ValueType};

/// Per-profile weights for the three detection signals. Not learned;
/// declared with the profile and versioned with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub filename: f32,
    pub structural: f32,
    pub keyword: f32,
}

impl SignalWeights {
    pub fn sum(&self) -> f32 {
        self.filename + self.structural + self.keyword
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            filename: 0.1,
            structural: 0.6,
            keyword: 0.3,
        }
    }
}

/// One expected source path with its importance weight.
///
/// `min_count`/`max_count` bound how many nodes must exist at the path:
/// the multi-session cases differ only in how many reading sessions a file
/// carries, so presence alone cannot separate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: String,
    pub importance: f32,
    pub min_count: usize,
    pub max_count: Option<usize>,
}

impl FieldSpec {
    pub fn new(path: impl Into<String>, importance: f32) -> Self {
        Self {
            path: path.into(),
            importance,
            min_count: 1,
            max_count: None,
        }
    }

    pub fn counted(
        path: impl Into<String>,
        importance: f32,
        min_count: usize,
        max_count: Option<usize>,
    ) -> Self {
        Self {
            path: path.into(),
            importance,
            min_count,
            max_count,
        }
    }
}

/// Named, side-effect-free string transform applied before type coercion.
/// The fixed table keeps reprocessing deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Trim,
    Lowercase,
    Uppercase,
    CollapseWhitespace,
    NormalizeDate,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trim => "trim",
            Self::Lowercase => "lowercase",
            Self::Uppercase => "uppercase",
            Self::CollapseWhitespace => "collapse_whitespace",
            Self::NormalizeDate => "normalize_date",
        }
    }
}

/// One field-mapping rule: where a canonical field comes from and how it is
/// typed, defaulted, and transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source_path: String,
    pub target_path: String,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<FieldValue>,
    pub transform: Option<Transform>,
    /// How the keyword extractor treats the mapped value.
    pub segment: SegmentKind,
}

impl MappingRule {
    pub fn new(
        source_path: impl Into<String>,
        target_path: impl Into<String>,
        value_type: ValueType,
        segment: SegmentKind,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            value_type,
            required: false,
            default: None,
            transform: None,
            segment,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// A named structural convention: how to recognize it and how to map it.
#[derive(Debug, Clone)]
pub struct CaseProfile {
    pub profile_id: String,
    pub version: String,
    pub description: String,
    pub filename_patterns: Vec<Regex>,
    pub expected_fields: Vec<FieldSpec>,
    /// Vocabulary terms whose presence in free text supports this case.
    pub keyword_terms: Vec<String>,
    pub weights: SignalWeights,
    pub mappings: Vec<MappingRule>,
}

impl CaseProfile {
    pub fn total_importance(&self) -> f32 {
        self.expected_fields.iter().map(|f| f.importance).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_match_calibration() {
        let w = SignalWeights::default();
        assert!((w.filename - 0.1).abs() < f32::EPSILON);
        assert!((w.structural - 0.6).abs() < f32::EPSILON);
        assert!((w.keyword - 0.3).abs() < f32::EPSILON);
        assert!((w.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn field_spec_defaults_to_single_occurrence() {
        let spec = FieldSpec::new("ResponseHeader/Version", 1.0);
        assert_eq!(spec.min_count, 1);
        assert_eq!(spec.max_count, None);
    }

    #[test]
    fn mapping_rule_builder_chain() {
        let rule = MappingRule::new(
            "ResponseHeader/StudyInstanceUID",
            "study/study_instance_uid",
            ValueType::Text,
            SegmentKind::Mixed,
        )
        .required()
        .with_transform(Transform::Trim);

        assert!(rule.required);
        assert_eq!(rule.transform, Some(Transform::Trim));
        assert_eq!(rule.default, None);
    }

    #[test]
    fn transform_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Transform::NormalizeDate).unwrap(),
            "\"normalize_date\""
        );
        assert_eq!(Transform::CollapseWhitespace.as_str(), "collapse_whitespace");
    }
}

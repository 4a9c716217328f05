//! The three detection signals, each scored in [0, 1].

use std::path::Path;

use crate::models::RawTree;
use crate::profiles::CaseProfile;

/// Structural signal outcome with the field-level detail review needs.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralScore {
    /// Importance-weighted presence fraction.
    pub score: f32,
    pub matched_fields: Vec<String>,
    pub missing_fields: Vec<String>,
    /// Unweighted percentage of expected fields present, 0 to 100.
    pub match_percentage: f32,
}

/// Binary filename signal: 1.0 when any profile pattern matches the
/// basename, 0.0 otherwise. Weak evidence; weighted low by default.
pub fn filename_signal(filename: &str, profile: &CaseProfile) -> f32 {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let matched = profile
        .filename_patterns
        .iter()
        .any(|pattern| pattern.is_match(basename));
    if matched {
        1.0
    } else {
        0.0
    }
}

/// Importance-weighted presence of the profile's expected fields.
///
/// A field counts as present only when its repetition count sits inside the
/// declared min/max bounds, so profiles that differ only in session count
/// score differently on the same header fields.
pub fn structural_signal(tree: &RawTree, profile: &CaseProfile) -> StructuralScore {
    let total_importance = profile.total_importance();
    let mut matched_importance = 0.0f32;
    let mut matched_fields = Vec::new();
    let mut missing_fields = Vec::new();

    for spec in &profile.expected_fields {
        let count = tree.nodes_at(&spec.path).len();
        let within_bounds =
            count >= spec.min_count && spec.max_count.map_or(true, |max| count <= max);
        if within_bounds {
            matched_importance += spec.importance;
            matched_fields.push(spec.path.clone());
        } else {
            missing_fields.push(spec.path.clone());
        }
    }

    let score = if total_importance > 0.0 {
        matched_importance / total_importance
    } else {
        0.0
    };
    let match_percentage = if profile.expected_fields.is_empty() {
        0.0
    } else {
        matched_fields.len() as f32 / profile.expected_fields.len() as f32 * 100.0
    };

    StructuralScore {
        score,
        matched_fields,
        missing_fields,
        match_percentage,
    }
}

/// Fraction of the profile's vocabulary terms that occur in the file's free
/// text. Case-insensitive containment; full canonicalization happens later
/// in keyword extraction, this signal only has to rank profiles.
pub fn keyword_signal(tree: &RawTree, profile: &CaseProfile) -> f32 {
    if profile.keyword_terms.is_empty() {
        return 0.0;
    }
    let text = tree
        .all_text_blocks()
        .iter()
        .map(|block| block.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return 0.0;
    }
    let hits = profile
        .keyword_terms
        .iter()
        .filter(|term| text.contains(&term.to_lowercase()))
        .count();
    hits as f32 / profile.keyword_terms.len() as f32
}

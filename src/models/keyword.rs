//! Keyword reference entities and per-record occurrences.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SegmentKind;

/// A canonical term with its aliases. Append-only reference data: aliases
/// may be added by an admin action, never removed or repointed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub canonical_term: String,
    pub aliases: Vec<String>,
    pub category: String,
    /// Where the entry came from: "bundled" or "admin".
    pub source: String,
}

/// One matched term in one record segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordOccurrence {
    pub record_id: Uuid,
    pub canonical_term: String,
    pub category: String,
    pub segment_kind: SegmentKind,
    /// The text as it appeared before canonicalization.
    pub surface_form: String,
    /// Token index within the segment the match started at.
    pub position: usize,
    pub relevance_score: f32,
    pub cross_validated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrence_serializes_segment_kind_snake_case() {
        let occ = KeywordOccurrence {
            record_id: Uuid::new_v4(),
            canonical_term: "pulmonary_nodule".into(),
            category: "finding".into(),
            segment_kind: SegmentKind::Qualitative,
            surface_form: "nodule".into(),
            position: 3,
            relevance_score: 1.25,
            cross_validated: false,
        };
        let json = serde_json::to_string(&occ).unwrap();
        assert!(json.contains("\"qualitative\""));
        assert!(json.contains("\"pulmonary_nodule\""));
    }

    #[test]
    fn keyword_round_trips() {
        let kw = Keyword {
            canonical_term: "spiculation".into(),
            aliases: vec!["spiculated".into(), "spicules".into()],
            category: "characteristic".into(),
            source: "bundled".into(),
        };
        let json = serde_json::to_string(&kw).unwrap();
        let back: Keyword = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kw);
    }
}

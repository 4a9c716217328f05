//! Keyword extraction over a canonical record's segments.
//!
//! Qualitative segments are tokenized and run through the match ladder.
//! Quantitative segments contribute pseudo-tokens built from the field's
//! leaf name and its coded value, so "malignancy = 1" surfaces as the
//! benign term even though no free text says so. A term seen in both a
//! qualitative and a quantitative segment is corroborated: every one of
//! its occurrences is flagged and its relevance is boosted.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{CanonicalRecord, FieldValue, KeywordOccurrence, SegmentKind};
use crate::profiles::CaseProfile;

use super::matcher::match_terms;
use super::tokenizer::tokenize;
use super::vocabulary::Vocabulary;

/// Corpus-level term statistics used for relevance weighting.
#[derive(Debug, Clone, Default)]
pub struct CorpusView {
    pub total_documents: i64,
    frequencies: HashMap<String, i64>,
}

impl CorpusView {
    pub fn new(total_documents: i64) -> Self {
        Self {
            total_documents,
            frequencies: HashMap::new(),
        }
    }

    pub fn with_frequency(mut self, term: impl Into<String>, documents: i64) -> Self {
        self.frequencies.insert(term.into(), documents);
        self
    }

    pub fn set_frequency(&mut self, term: impl Into<String>, documents: i64) {
        self.frequencies.insert(term.into(), documents);
    }

    pub fn document_frequency(&self, term: &str) -> i64 {
        self.frequencies.get(term).copied().unwrap_or(0)
    }
}

/// Smoothed inverse document frequency.
///
/// `ln(1 + total/df)` stays strictly positive even for terms present in
/// every document, which keeps the corroboration boost observable. An
/// empty corpus has no frequency signal, so it weights every term 1.0.
pub fn inverse_document_frequency(total_documents: i64, document_frequency: i64) -> f32 {
    if total_documents <= 0 {
        return 1.0;
    }
    let df = document_frequency.max(1) as f32;
    (1.0 + total_documents as f32 / df).ln()
}

/// Extract scored keyword occurrences from one canonical record.
///
/// `cross_validation_boost` multiplies the relevance of corroborated
/// terms; 1.0 disables the boost.
pub fn extract_keywords(
    record: &CanonicalRecord,
    profile: &CaseProfile,
    vocabulary: &Vocabulary,
    corpus: &CorpusView,
    cross_validation_boost: f32,
) -> Vec<KeywordOccurrence> {
    let mut occurrences = Vec::new();

    for (target_path, value) in &record.fields {
        let segment = segment_of(profile, target_path);
        match segment {
            SegmentKind::Qualitative | SegmentKind::Mixed => {
                collect_text_occurrences(record, value, segment, vocabulary, &mut occurrences);
            }
            SegmentKind::Quantitative => {
                collect_coded_occurrences(record, target_path, value, vocabulary, &mut occurrences);
            }
        }
    }

    apply_cross_validation(&mut occurrences);
    apply_relevance(&mut occurrences, corpus, cross_validation_boost);

    debug!(
        record_id = %record.record_id,
        occurrences = occurrences.len(),
        "keyword extraction complete"
    );
    occurrences
}

fn segment_of(profile: &CaseProfile, target_path: &str) -> SegmentKind {
    profile
        .mappings
        .iter()
        .find(|rule| rule.target_path == target_path)
        .map(|rule| rule.segment)
        .unwrap_or(SegmentKind::Mixed)
}

fn collect_text_occurrences(
    record: &CanonicalRecord,
    value: &FieldValue,
    segment: SegmentKind,
    vocabulary: &Vocabulary,
    occurrences: &mut Vec<KeywordOccurrence>,
) {
    let text = value.to_display_string();
    if text.is_empty() {
        return;
    }
    for matched in match_terms(&tokenize(&text), vocabulary) {
        occurrences.push(KeywordOccurrence {
            record_id: record.record_id,
            canonical_term: matched.canonical_term,
            category: matched.category,
            segment_kind: segment,
            surface_form: matched.surface_form,
            position: matched.position,
            relevance_score: 0.0,
            cross_validated: false,
        });
    }
}

/// Pseudo-tokens for a coded field: the leaf name itself, plus
/// `leaf_value` for each element so coded levels can remap (for example
/// `malignancy_1` resolves to the benign term).
fn collect_coded_occurrences(
    record: &CanonicalRecord,
    target_path: &str,
    value: &FieldValue,
    vocabulary: &Vocabulary,
    occurrences: &mut Vec<KeywordOccurrence>,
) {
    let leaf = target_path.rsplit('/').next().unwrap_or(target_path);
    let leaf_term = resolve_exact_or_alias(leaf, vocabulary);
    let elements = coded_elements(value);

    for (position, element) in elements.iter().enumerate() {
        if let Some((canonical, category)) = &leaf_term {
            occurrences.push(KeywordOccurrence {
                record_id: record.record_id,
                canonical_term: canonical.clone(),
                category: category.clone(),
                segment_kind: SegmentKind::Quantitative,
                surface_form: leaf.to_string(),
                position,
                relevance_score: 0.0,
                cross_validated: false,
            });
        }

        if let Some(element) = element {
            let coded_surface = format!("{leaf}_{element}");
            if let Some((canonical, category)) =
                resolve_exact_or_alias(&coded_surface, vocabulary)
            {
                let duplicate = leaf_term
                    .as_ref()
                    .is_some_and(|(leaf_canonical, _)| *leaf_canonical == canonical);
                if !duplicate {
                    occurrences.push(KeywordOccurrence {
                        record_id: record.record_id,
                        canonical_term: canonical,
                        category,
                        segment_kind: SegmentKind::Quantitative,
                        surface_form: coded_surface,
                        position,
                        relevance_score: 0.0,
                        cross_validated: false,
                    });
                }
            }
        }
    }
}

/// Element values for pseudo-token suffixes. Non-integer quantitative
/// fields still contribute their leaf name, just no coded suffix.
fn coded_elements(value: &FieldValue) -> Vec<Option<String>> {
    match value {
        FieldValue::Integer(v) => vec![Some(v.to_string())],
        FieldValue::IntegerArray(values) => {
            values.iter().map(|v| Some(v.to_string())).collect()
        }
        FieldValue::FloatArray(values) => vec![None; values.len().max(1)],
        _ => vec![None],
    }
}

fn resolve_exact_or_alias(surface: &str, vocabulary: &Vocabulary) -> Option<(String, String)> {
    vocabulary
        .lookup_canonical(surface)
        .or_else(|| vocabulary.lookup_alias(surface))
        .map(|term| (term.canonical_term.clone(), term.category.clone()))
}

/// A term is corroborated when it occurs in at least one qualitative and
/// at least one quantitative segment. Mixed occurrences count toward
/// neither side but inherit the flag.
fn apply_cross_validation(occurrences: &mut [KeywordOccurrence]) {
    let mut qualitative: HashSet<&str> = HashSet::new();
    let mut quantitative: HashSet<&str> = HashSet::new();
    for occurrence in occurrences.iter() {
        match occurrence.segment_kind {
            SegmentKind::Qualitative => {
                qualitative.insert(occurrence.canonical_term.as_str());
            }
            SegmentKind::Quantitative => {
                quantitative.insert(occurrence.canonical_term.as_str());
            }
            SegmentKind::Mixed => {}
        }
    }

    let corroborated: HashSet<String> = qualitative
        .intersection(&quantitative)
        .map(|term| term.to_string())
        .collect();

    for occurrence in occurrences.iter_mut() {
        if corroborated.contains(&occurrence.canonical_term) {
            occurrence.cross_validated = true;
        }
    }
}

/// relevance = tf x idf x boost, where tf counts the term across every
/// segment of this record.
fn apply_relevance(
    occurrences: &mut [KeywordOccurrence],
    corpus: &CorpusView,
    cross_validation_boost: f32,
) {
    let mut term_frequency: HashMap<&str, usize> = HashMap::new();
    for occurrence in occurrences.iter() {
        *term_frequency
            .entry(occurrence.canonical_term.as_str())
            .or_insert(0) += 1;
    }
    let term_frequency: HashMap<String, usize> = term_frequency
        .into_iter()
        .map(|(term, count)| (term.to_string(), count))
        .collect();

    for occurrence in occurrences.iter_mut() {
        let tf = term_frequency
            .get(&occurrence.canonical_term)
            .copied()
            .unwrap_or(1) as f32;
        let idf = inverse_document_frequency(
            corpus.total_documents,
            corpus.document_frequency(&occurrence.canonical_term),
        );
        let boost = if occurrence.cross_validated {
            cross_validation_boost
        } else {
            1.0
        };
        occurrence.relevance_score = tf * idf * boost;
    }
}

//! The term match ladder: exact canonical, declared alias, then a bounded
//! fuzzy pass for near-misses.

use serde::{Deserialize, Serialize};

use crate::models::Keyword;

use super::tokenizer::{stem_light, Token};
use super::vocabulary::Vocabulary;

/// Fuzzy matching never fires on words shorter than this.
pub const MIN_FUZZY_WORD_LEN: usize = 5;
/// Maximum edit distance the fuzzy tier accepts.
pub const MAX_FUZZY_DISTANCE: usize = 2;

/// Which tier of the ladder produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Alias,
    Fuzzy,
}

/// One resolved term occurrence inside a token stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatch {
    pub canonical_term: String,
    pub category: String,
    pub kind: MatchKind,
    /// The text as it appeared, before canonicalization.
    pub surface_form: String,
    /// Position of the first token of the match.
    pub position: usize,
    /// Number of tokens consumed; more than 1 for phrase surfaces.
    pub token_span: usize,
}

/// Resolve vocabulary terms in a token stream.
///
/// Phrases are probed longest-first so "pulmonary nodule" resolves as one
/// term rather than as "pulmonary" plus "nodule". Fuzzy matching applies
/// to single tokens only and is rejected when two different terms are
/// equally close.
pub fn match_terms(tokens: &[Token], vocabulary: &Vocabulary) -> Vec<TermMatch> {
    let mut matches = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if let Some((term_match, consumed)) = match_at(tokens, i, vocabulary) {
            matches.push(term_match);
            i += consumed;
        } else {
            i += 1;
        }
    }
    matches
}

fn match_at(
    tokens: &[Token],
    start: usize,
    vocabulary: &Vocabulary,
) -> Option<(TermMatch, usize)> {
    let max_window = vocabulary.max_phrase_words().min(tokens.len() - start);

    // Longest phrase first.
    for window in (2..=max_window).rev() {
        let phrase: Vec<&str> = tokens[start..start + window]
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        let surface = phrase.join(" ");
        if let Some((term, kind)) = resolve_surface(&surface, vocabulary) {
            return Some((
                TermMatch {
                    canonical_term: term.canonical_term.clone(),
                    category: term.category.clone(),
                    kind,
                    surface_form: surface,
                    position: tokens[start].position,
                    token_span: window,
                },
                window,
            ));
        }
    }

    let word = &tokens[start].text;
    if vocabulary.is_stopword(word) {
        return None;
    }

    let resolved = resolve_surface(word, vocabulary)
        .or_else(|| {
            let stemmed = stem_light(word);
            if stemmed != *word {
                resolve_surface(&stemmed, vocabulary)
            } else {
                None
            }
        })
        .or_else(|| fuzzy_match(word, vocabulary).map(|term| (term, MatchKind::Fuzzy)));

    resolved.map(|(term, kind)| {
        (
            TermMatch {
                canonical_term: term.canonical_term.clone(),
                category: term.category.clone(),
                kind,
                surface_form: word.clone(),
                position: tokens[start].position,
                token_span: 1,
            },
            1,
        )
    })
}

fn resolve_surface<'v>(
    surface: &str,
    vocabulary: &'v Vocabulary,
) -> Option<(&'v Keyword, MatchKind)> {
    if let Some(term) = vocabulary.lookup_canonical(surface) {
        return Some((term, MatchKind::Exact));
    }
    vocabulary
        .lookup_alias(surface)
        .map(|term| (term, MatchKind::Alias))
}

/// Bounded fuzzy lookup over single-word surfaces.
///
/// Requires the word to be at least [`MIN_FUZZY_WORD_LEN`] characters and
/// within [`MAX_FUZZY_DISTANCE`] edits of exactly one term; a tie between
/// different terms rejects the whole word rather than guessing.
fn fuzzy_match<'v>(word: &str, vocabulary: &'v Vocabulary) -> Option<&'v Keyword> {
    if word.chars().count() < MIN_FUZZY_WORD_LEN {
        return None;
    }
    let word_len = word.chars().count();

    let mut best: Option<(&Keyword, usize)> = None;
    let mut ambiguous = false;

    for (surface, term) in vocabulary.single_word_surfaces() {
        // Length difference already exceeding the budget cannot match.
        if surface.chars().count().abs_diff(word_len) > MAX_FUZZY_DISTANCE {
            continue;
        }
        let distance = edit_distance(word, surface);
        if distance == 0 || distance > MAX_FUZZY_DISTANCE {
            continue;
        }
        match best {
            None => best = Some((term, distance)),
            Some((best_term, best_distance)) => {
                if distance < best_distance {
                    best = Some((term, distance));
                    ambiguous = false;
                } else if distance == best_distance
                    && best_term.canonical_term != term.canonical_term
                {
                    ambiguous = true;
                }
            }
        }
    }

    match best {
        Some((term, _)) if !ambiguous => Some(term),
        _ => None,
    }
}

/// Levenshtein distance with the two-row rolling table.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

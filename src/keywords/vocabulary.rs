//! The controlled vocabulary: canonical terms, their aliases, and the
//! stopword list. A bundled copy ships inside the binary; admin-added
//! terms from the database extend it at load time.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::models::Keyword;

const BUNDLED_VOCABULARY: &str =
    include_str!("../../resources/vocabulary/radiology_terms.json");

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("vocabulary JSON is invalid: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    version: String,
    terms: Vec<TermEntry>,
    #[serde(default)]
    stopwords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TermEntry {
    canonical: String,
    category: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Indexed vocabulary. Lookups are by lowercase surface form; multiword
/// surfaces are stored space-joined so the matcher can probe n-grams.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    version: String,
    terms: Vec<Keyword>,
    canonical_index: HashMap<String, usize>,
    alias_index: HashMap<String, usize>,
    /// Single-word surfaces in declaration order, for the fuzzy scan.
    single_word_surfaces: Vec<(String, usize)>,
    stopwords: HashSet<String>,
    max_phrase_words: usize,
}

impl Vocabulary {
    /// The vocabulary compiled into the binary.
    pub fn bundled() -> &'static Vocabulary {
        &BUNDLED
    }

    pub fn from_json(json: &str) -> Result<Self, VocabularyError> {
        let file: VocabularyFile = serde_json::from_str(json)?;
        let terms = file
            .terms
            .into_iter()
            .map(|entry| Keyword {
                canonical_term: entry.canonical,
                aliases: entry.aliases,
                category: entry.category,
                source: "bundled".to_string(),
            })
            .collect();
        Ok(Self::build(file.version, terms, file.stopwords))
    }

    pub fn build(version: String, terms: Vec<Keyword>, stopwords: Vec<String>) -> Self {
        let mut vocabulary = Self {
            version,
            terms: Vec::new(),
            canonical_index: HashMap::new(),
            alias_index: HashMap::new(),
            single_word_surfaces: Vec::new(),
            stopwords: stopwords.into_iter().map(|w| w.to_lowercase()).collect(),
            max_phrase_words: 1,
        };
        for term in terms {
            vocabulary.insert_term(term);
        }
        vocabulary
    }

    /// Add terms on top of the existing set, e.g. admin keywords from the
    /// database. First definition of a surface wins.
    pub fn extend(&mut self, terms: Vec<Keyword>) {
        for term in terms {
            self.insert_term(term);
        }
    }

    fn insert_term(&mut self, term: Keyword) {
        let index = self.terms.len();
        let canonical_key = term.canonical_term.to_lowercase();
        let spaced = canonical_key.replace('_', " ");

        self.register_surface(&canonical_key, index, true);
        if spaced != canonical_key {
            self.register_surface(&spaced, index, true);
        }
        for alias in &term.aliases {
            self.register_surface(&alias.to_lowercase(), index, false);
        }
        self.terms.push(term);
    }

    fn register_surface(&mut self, surface: &str, index: usize, canonical: bool) {
        let words = surface.split_whitespace().count().max(1);
        self.max_phrase_words = self.max_phrase_words.max(words);

        let table = if canonical {
            &mut self.canonical_index
        } else {
            &mut self.alias_index
        };
        if let Some(existing) = table.get(surface) {
            if *existing != index {
                warn!(surface, "duplicate vocabulary surface ignored");
            }
            return;
        }
        table.insert(surface.to_string(), index);
        if words == 1 {
            self.single_word_surfaces.push((surface.to_string(), index));
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn terms(&self) -> &[Keyword] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Exact canonical surface, e.g. "malignancy" or "pulmonary nodule".
    pub fn lookup_canonical(&self, surface: &str) -> Option<&Keyword> {
        self.canonical_index
            .get(surface)
            .map(|&index| &self.terms[index])
    }

    /// Declared alias surface, e.g. "spiculated" or "ggo".
    pub fn lookup_alias(&self, surface: &str) -> Option<&Keyword> {
        self.alias_index
            .get(surface)
            .map(|&index| &self.terms[index])
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Longest surface in words; bounds the matcher's n-gram window.
    pub fn max_phrase_words(&self) -> usize {
        self.max_phrase_words
    }

    /// Every single-word surface with its term, in declaration order.
    pub fn single_word_surfaces(&self) -> impl Iterator<Item = (&str, &Keyword)> {
        self.single_word_surfaces
            .iter()
            .map(|(surface, index)| (surface.as_str(), &self.terms[*index]))
    }
}

static BUNDLED: LazyLock<Vocabulary> = LazyLock::new(|| {
    Vocabulary::from_json(BUNDLED_VOCABULARY).expect("bundled vocabulary must parse")
});

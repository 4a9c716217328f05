//! Keyword extraction and canonicalization.
//!
//! A controlled vocabulary maps the many spellings in annotation files to
//! canonical terms. Extraction walks a canonical record segment by
//! segment, resolves surfaces through the exact/alias/fuzzy ladder, and
//! scores each occurrence by corpus-weighted term frequency with a boost
//! for terms corroborated across segment kinds.

pub mod extractor;
pub mod matcher;
pub mod tokenizer;
pub mod vocabulary;

pub use extractor::{extract_keywords, inverse_document_frequency, CorpusView};
pub use matcher::{match_terms, MatchKind, TermMatch};
pub use tokenizer::{stem_light, tokenize, Token};
pub use vocabulary::{Vocabulary, VocabularyError};

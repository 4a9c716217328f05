//! Canonical record: the normalized, format-independent form of a document.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed field value. Arrays carry one element per source repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    TextArray(Vec<String>),
    IntegerArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Render for keyword stringification. Arrays join with a space so each
    /// element tokenizes on its own.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::TextArray(items) => items.join(" "),
            Self::IntegerArray(items) => items
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            Self::FloatArray(items) => items
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// One version of one source file's canonical form.
///
/// `fields` is ordered by target path. Unresolved required fields land in
/// `missing_required` instead of failing the record; reprocessing writes a
/// new version rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub record_id: Uuid,
    /// Queue item this record was mapped from.
    pub source_id: Uuid,
    /// 1 for the first mapping, incremented by reprocessing.
    pub version: i64,
    pub profile_id: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub missing_required: BTreeSet<String>,
    pub created_at: String,
}

impl CanonicalRecord {
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }

    pub fn field(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get(path)
    }
}

//! Coercion of extracted text values into typed canonical fields.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{FieldValue, ValueType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("no value to coerce")]
    Empty,
    #[error("cannot coerce '{value}' to {target}")]
    Parse { value: String, target: &'static str },
}

/// Coerce one or more raw text values into the declared field type.
///
/// Scalar targets read the first value; array targets consume every value
/// in document order. A single unparseable element fails the whole array,
/// which sends the rule through its default-then-missing fallback.
pub fn coerce(values: &[String], value_type: ValueType) -> Result<FieldValue, CoerceError> {
    let first = values.first().ok_or(CoerceError::Empty)?;
    match value_type {
        ValueType::Text => Ok(FieldValue::Text(first.clone())),
        ValueType::Integer => parse_integer(first).map(FieldValue::Integer),
        ValueType::Float => parse_float(first).map(FieldValue::Float),
        ValueType::Boolean => parse_boolean(first).map(FieldValue::Boolean),
        ValueType::Date => parse_date(first).map(FieldValue::Date),
        ValueType::TextArray => Ok(FieldValue::TextArray(values.to_vec())),
        ValueType::IntegerArray => values
            .iter()
            .map(|v| parse_integer(v))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::IntegerArray),
        ValueType::FloatArray => values
            .iter()
            .map(|v| parse_float(v))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::FloatArray),
    }
}

fn parse_integer(value: &str) -> Result<i64, CoerceError> {
    value.trim().parse::<i64>().map_err(|_| CoerceError::Parse {
        value: value.to_string(),
        target: "integer",
    })
}

fn parse_float(value: &str) -> Result<f64, CoerceError> {
    value.trim().parse::<f64>().map_err(|_| CoerceError::Parse {
        value: value.to_string(),
        target: "float",
    })
}

fn parse_boolean(value: &str) -> Result<bool, CoerceError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(CoerceError::Parse {
            value: value.to_string(),
            target: "boolean",
        }),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, CoerceError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| CoerceError::Parse {
        value: value.to_string(),
        target: "date",
    })
}

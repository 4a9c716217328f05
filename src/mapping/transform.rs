//! Value transforms applied between extraction and coercion.

use crate::profiles::Transform;

/// Apply one declarative transform to a raw text value.
pub fn apply_transform(transform: Transform, value: &str) -> String {
    match transform {
        Transform::Trim => value.trim().to_string(),
        Transform::Lowercase => value.to_lowercase(),
        Transform::Uppercase => value.to_uppercase(),
        Transform::CollapseWhitespace => value.split_whitespace().collect::<Vec<_>>().join(" "),
        Transform::NormalizeDate => normalize_date(value),
    }
}

/// Normalize the date spellings seen in annotation headers to ISO
/// `YYYY-MM-DD`. Unrecognized shapes pass through unchanged so coercion
/// can report them.
fn normalize_date(value: &str) -> String {
    let trimmed = value.trim();

    // Already ISO.
    if trimmed.len() == 10 && trimmed.as_bytes().get(4) == Some(&b'-') {
        return trimmed.to_string();
    }

    // Compact form: 20260109.
    if trimmed.len() == 8 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return format!("{}-{}-{}", &trimmed[..4], &trimmed[4..6], &trimmed[6..8]);
    }

    // US form: 01/09/2026.
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() == 3 && parts[2].len() == 4 {
        return format!("{}-{:0>2}-{:0>2}", parts[2], parts[0], parts[1]);
    }

    trimmed.to_string()
}

//! Free-text tokenization for keyword matching.

/// One lowercase word token with its position in the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Word index within the segment, counting every token including
    /// stopwords so positions stay stable.
    pub position: usize,
}

/// Split free text into lowercase word tokens.
///
/// Words are runs of alphanumerics; internal hyphens and underscores are
/// kept so "non-nodule" and coded surfaces like "malignancy_5" survive as
/// single tokens. Everything else separates.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut position = 0usize;

    let mut flush = |current: &mut String, tokens: &mut Vec<Token>, position: &mut usize| {
        let word = current.trim_matches(|c| c == '-' || c == '_');
        if !word.is_empty() {
            tokens.push(Token {
                text: word.to_string(),
                position: *position,
            });
            *position += 1;
        }
        current.clear();
    };

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                current.push(lower);
            }
        } else if (ch == '-' || ch == '_') && !current.is_empty() {
            current.push(ch);
        } else {
            flush(&mut current, &mut tokens, &mut position);
        }
    }
    flush(&mut current, &mut tokens, &mut position);
    tokens
}

/// Light plural stemming. The vocabulary already lists common plurals as
/// aliases; this only catches unlisted ones, so it stays conservative.
pub fn stem_light(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if stem.len() >= 2 {
            return format!("{stem}y");
        }
    }
    if let Some(stem) = word.strip_suffix("es") {
        if stem.ends_with('s') || stem.ends_with('x') || stem.ends_with('z')
            || stem.ends_with("ch") || stem.ends_with("sh")
        {
            return stem.to_string();
        }
    }
    if let Some(stem) = word.strip_suffix('s') {
        // Leave Latin-style -is/-us endings (atelectasis, bronchus) alone.
        let ends_badly = stem.ends_with('s') || stem.ends_with('i') || stem.ends_with('u');
        if stem.len() >= 3 && !ends_badly {
            return stem.to_string();
        }
    }
    word.to_string()
}

//! Tokenisation: text -> lowercase alphanumeric token stream.
//!
//! The same function is used at index-build time and query time; any
//! divergence between the two would silently break retrieval.

/// Split `text` into lowercase alphanumeric tokens.
///
/// Splits on any non-alphanumeric boundary, drops empty tokens, and
/// preserves order. No stemming, no stop-list.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Tokenise and fold into per-term frequency counts, preserving first-seen
/// term order (so callers producing deterministic output don't depend on
/// hash-map iteration order downstream).
pub fn term_frequencies(text: &str) -> Vec<(String, u32)> {
    let tokens = tokenize(text);
    let mut counts: Vec<(String, u32)> = Vec::new();
    for tok in tokens {
        if let Some(entry) = counts.iter_mut().find(|(t, _)| *t == tok) {
            entry.1 += 1;
        } else {
            counts.push((tok, 1));
        }
    }
    counts
}

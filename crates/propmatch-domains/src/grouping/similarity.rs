use std::collections::HashSet;

/// Character-trigram Jaccard similarity between two free-text strings.
///
/// Strings are lowercased, stripped of anything that is not a letter, digit,
/// or whitespace, and padded with two spaces on each side before extracting
/// overlapping 3-character windows. Returns 0.0 when either side has no
/// usable text, and never divides by zero.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let intersection = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

fn trigrams(text: &str) -> HashSet<(char, char, char)> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    if normalized.trim().is_empty() {
        return HashSet::new();
    }

    let padded: Vec<char> = "  "
        .chars()
        .chain(normalized.trim().chars())
        .chain("  ".chars())
        .collect();

    padded
        .windows(3)
        .map(|w| (w[0], w[1], w[2]))
        .collect()
}

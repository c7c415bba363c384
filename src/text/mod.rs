//! Tokenization and textual similarity shared by lexical scoring, deduplication
//! and relationship detection

use ahash::{AHashSet, AHasher};
use regex::Regex;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").expect("word regex is valid"))
}

/// Split text into lowercase search terms.
///
/// Identifiers are emitted whole and also broken on `snake_case` and
/// `camelCase` boundaries, so `parseHttpHeader` yields `parsehttpheader`,
/// `parse`, `http` and `header`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for word in word_regex().find_iter(text) {
        let word = word.as_str();
        let whole = word.to_lowercase();
        let parts = split_identifier(word);

        if whole.len() > 1 && !whole.chars().all(|c| c == '_') {
            tokens.push(whole.trim_matches('_').to_string());
        }

        if parts.len() > 1 {
            tokens.extend(parts.into_iter().filter(|p| p.len() > 1));
        }
    }

    tokens
}

/// Break an identifier on underscores and lower-to-upper case transitions
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();

    for segment in word.split('_').filter(|s| !s.is_empty()) {
        let chars: Vec<char> = segment.chars().collect();
        let mut current = String::new();

        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0
                && c.is_uppercase()
                && (chars[i - 1].is_lowercase()
                    || chars.get(i + 1).is_some_and(|next| next.is_lowercase())
                        && chars[i - 1].is_uppercase());

            if boundary && !current.is_empty() {
                parts.push(current.to_lowercase());
                current.clear();
            }
            current.push(c);
        }

        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }

    parts
}

/// Lowercase word sequence used for shingling, without identifier expansion
fn words(text: &str) -> Vec<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn hash_shingle(words: &[String]) -> u64 {
    let mut hasher = AHasher::default();
    words.hash(&mut hasher);
    hasher.finish()
}

/// Hashed word n-grams of `text`. Texts shorter than `size` words produce a
/// single shingle covering the whole text.
pub fn shingles(text: &str, size: usize) -> AHashSet<u64> {
    let words = words(text);
    let size = size.max(1);

    if words.is_empty() {
        return AHashSet::new();
    }

    if words.len() <= size {
        let mut set = AHashSet::with_capacity(1);
        set.insert(hash_shingle(&words));
        return set;
    }

    words.windows(size).map(hash_shingle).collect()
}

/// Jaccard similarity of two shingle sets, in [0, 1].
///
/// Two empty sets carry no evidence of overlap and score 0; callers compare
/// raw contents when exact equality matters.
pub fn jaccard(a: &AHashSet<u64>, b: &AHashSet<u64>) -> f32 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;

    if union == 0 {
        return 0.0;
    }

    intersection as f32 / union as f32
}

/// Textual similarity between two contents using word shingles
pub fn content_similarity(a: &str, b: &str, shingle_size: usize) -> f32 {
    if a == b {
        return 1.0;
    }
    jaccard(&shingles(a, shingle_size), &shingles(b, shingle_size))
}

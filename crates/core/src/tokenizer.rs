//! Text → normalized term sequence.
//!
//! Generalizes the camelCase/digit boundary classification that
//! `codescope-core::fuzzy`'s bonus table and `scan::describe`'s word
//! splitter already perform for display, into an indexing tokenizer whose
//! output is a deterministic, order-preserving sequence of terms.

use serde::{Deserialize, Serialize};

/// Options that must be identical between the index that was built and the
/// query that searches it — persisted in the store's `meta` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerOptions {
    pub stem: bool,
    pub stopwords: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self { stem: false, stopwords: true }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Lower,
    Upper,
    Digit,
}

fn classify(c: u8) -> CharClass {
    match c {
        b'a'..=b'z' | b'_' => CharClass::Lower,
        b'A'..=b'Z' => CharClass::Upper,
        b'0'..=b'9' => CharClass::Digit,
        _ => CharClass::Lower,
    }
}

/// Split one raw `[A-Za-z0-9_]+` run into identifier sub-parts: underscore
/// boundaries, camelCase/PascalCase boundaries, and digit↔letter boundaries.
fn split_identifier(raw: &str) -> Vec<String> {
    let bytes = raw.as_bytes();
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();

    for i in 0..bytes.len() {
        let b = bytes[i];
        if b == b'_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }

        if i > 0 {
            let prev = bytes[i - 1];
            let mut boundary = false;
            if prev != b'_' {
                let prev_class = classify(prev);
                let curr_class = classify(b);
                match (prev_class, curr_class) {
                    (CharClass::Lower, CharClass::Upper) => boundary = true,
                    (CharClass::Upper, CharClass::Upper) => {
                        if i + 1 < bytes.len() && classify(bytes[i + 1]) == CharClass::Lower {
                            boundary = true;
                        }
                    }
                    (CharClass::Digit, CharClass::Upper)
                    | (CharClass::Digit, CharClass::Lower)
                    | (CharClass::Upper, CharClass::Digit)
                    | (CharClass::Lower, CharClass::Digit) => boundary = true,
                    _ => {}
                }
            }
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push((b as char).to_ascii_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Extract maximal `[A-Za-z0-9_]+` runs from free text.
fn extract_runs(text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let bytes = text.as_bytes();
    let mut start: Option<usize> = None;
    for (i, &b) in bytes.iter().enumerate() {
        let is_word = b.is_ascii_alphanumeric() || b == b'_';
        match (is_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(&text[s..i]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(&text[s..]);
    }
    runs
}

/// Strip `-ing`, `-ed`, `-es`, `-s` in that order when the residue stays
/// at least 3 characters long. Deterministic, not Porter-complete by design.
fn stem(word: &str) -> String {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(residue) = word.strip_suffix(suffix) {
            if residue.len() >= 3 {
                return residue.to_string();
            }
        }
    }
    word.to_string()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do", "does",
    "else", "for", "from", "had", "has", "have", "he", "her", "here", "his", "how", "i", "if",
    "in", "is", "it", "its", "not", "of", "on", "or", "our", "she", "should", "so", "that", "the",
    "their", "them", "there", "they", "this", "to", "was", "we", "were", "what", "when", "where",
    "which", "who", "whom", "why", "will", "with", "would", "you", "your",
];

fn is_stopword(term: &str) -> bool {
    STOPWORDS.binary_search(&term).is_ok()
}

/// Tokenize `text` into an ordered sequence of normalized terms.
pub fn tokenize(text: &str, opts: &TokenizerOptions) -> Vec<String> {
    let mut out = Vec::new();
    for raw in extract_runs(text) {
        let whole = raw.to_ascii_lowercase();
        let sub_tokens = split_identifier(raw);

        if sub_tokens.len() == 1 && sub_tokens[0] == whole {
            out.push(whole);
        } else {
            out.extend(sub_tokens.into_iter().filter(|t| !t.is_empty()));
            if !whole.is_empty() {
                out.push(whole);
            }
        }
    }

    if opts.stopwords {
        out.retain(|t| !is_stopword(t));
    }
    if opts.stem {
        out = out.into_iter().map(|t| stem(&t)).collect();
    }
    out
}

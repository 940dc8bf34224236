//! Picks the best-matching line of a document for display and marks the
//! byte spans within it that matched a query term.

use crate::tokenizer::{self, TokenizerOptions};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub line_number: usize,
    pub line_text: String,
    /// Byte-offset `(start, end)` ranges into `line_text` that matched.
    pub spans: Vec<(usize, usize)>,
}

/// Find the first line maximizing the count of *distinct* matched terms
/// occurring as whole words, and mark the byte spans of any raw run whose
/// lowercased sub-tokens intersect `matched_terms`. Returns `None` for an
/// empty document.
pub fn build(content: &str, matched_terms: &HashSet<String>, opts: &TokenizerOptions) -> Option<Snippet> {
    let plain = TokenizerOptions { stem: false, stopwords: opts.stopwords };

    let mut best: Option<(usize, usize, &str)> = None; // (score, line_number, text)
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let tokens = tokenizer::tokenize(line, &plain);
        let score = tokens.iter().filter(|t| matched_terms.contains(*t)).collect::<HashSet<_>>().len();
        if score == 0 {
            continue;
        }
        let better = best.map_or(true, |(best_score, _, _)| score > best_score);
        if better {
            best = Some((score, idx, line));
        }
    }

    let (_, line_number, line_text) = best.or_else(|| {
        content.lines().enumerate().next().map(|(idx, line)| (0, idx, line))
    })?;

    let spans = find_spans(line_text, matched_terms, &plain);

    Some(Snippet { line_number: line_number + 1, line_text: line_text.to_string(), spans })
}

/// Locate byte spans of raw identifier runs in `line` whose sub-tokens hit
/// `matched_terms`.
fn find_spans(line: &str, matched_terms: &HashSet<String>, opts: &TokenizerOptions) -> Vec<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let run = &line[start..i];
            let sub_tokens = tokenizer::tokenize(run, opts);
            if sub_tokens.iter().any(|t| matched_terms.contains(t)) {
                spans.push((start, i));
            }
        } else {
            i += 1;
        }
    }
    spans
}

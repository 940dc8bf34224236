//! BM25 scoring over posting lists, with path-token boosting and
//! deterministic top-k selection.

use crate::planner;
use crate::store::Store;
use crate::tokenizer::{self, TokenizerOptions};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub k: usize,
    pub k1: f64,
    pub b: f64,
    pub path_boost: f64,
    pub path_filter: Option<String>,
    pub ext_filter: Option<HashSet<String>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { k: 10, k1: 1.2, b: 0.75, path_boost: 1.5, path_filter: None, ext_filter: None }
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub doc_id: i64,
    pub score: f64,
    pub path: String,
    pub matched_terms: Vec<String>,
}

fn passes_filters(path: &str, opts: &SearchOptions) -> bool {
    if let Some(substr) = &opts.path_filter {
        if !path.to_lowercase().contains(&substr.to_lowercase()) {
            return false;
        }
    }
    if let Some(exts) = &opts.ext_filter {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        if !exts.contains(&ext) {
            return false;
        }
    }
    true
}

/// Does `term` occur (case-insensitive, as a substring) among the
/// identifier-split sub-tokens of `path`?
fn path_contains_term(path: &str, term: &str) -> bool {
    let plain = TokenizerOptions { stem: false, stopwords: false };
    tokenizer::tokenize(path, &plain).iter().any(|tok| tok.contains(term))
}

/// Run a search against the open store, returning up to `opts.k` hits in
/// descending score order, ties broken by ascending path.
pub fn search(
    store: &Store,
    query: &str,
    tokenizer_opts: &TokenizerOptions,
    opts: &SearchOptions,
) -> crate::error::Result<Vec<Hit>> {
    let (n, sum_len) = store.globals()?;
    if n == 0 {
        return Ok(Vec::new());
    }

    let groups = planner::plan(store, query, tokenizer_opts);
    let term_set = planner::union(&groups);
    if term_set.is_empty() {
        return Ok(Vec::new());
    }

    let avgdl = sum_len as f64 / (n.max(1) as f64);

    // doc_id -> (running score, matched term texts, path, length)
    let mut running: HashMap<i64, (f64, HashSet<String>)> = HashMap::new();
    let mut doc_cache: HashMap<i64, Option<(String, i64)>> = HashMap::new();

    for &term_id in &term_set {
        let df = store.term_df(term_id)?;
        if df == 0 {
            continue;
        }
        let term_text = store.term_text(term_id)?.unwrap_or_default();
        let idf = ((n as f64 - df as f64 + 0.5) / (df as f64 + 0.5) + 1.0).ln();

        for (doc_id, tf) in store.iter_postings(term_id)? {
            let doc = doc_cache
                .entry(doc_id)
                .or_insert_with(|| store.get_doc(doc_id).ok().flatten())
                .clone();
            let Some((path, length)) = doc else { continue };
            if length == 0 {
                continue;
            }
            if !passes_filters(&path, opts) {
                continue;
            }

            let tf = tf as f64;
            let denom = tf + opts.k1 * (1.0 - opts.b + opts.b * (length as f64) / avgdl);
            let mut term_score = idf * (tf * (opts.k1 + 1.0)) / denom;

            if path_contains_term(&path, &term_text) {
                term_score *= opts.path_boost;
            }

            let entry = running.entry(doc_id).or_insert_with(|| (0.0, HashSet::new()));
            entry.0 += term_score;
            entry.1.insert(term_text.clone());
        }
    }

    #[derive(PartialEq)]
    struct Scored {
        score: f64,
        path: String,
        doc_id: i64,
        matched_terms: Vec<String>,
    }
    impl Eq for Scored {}
    impl Ord for Scored {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            // Min-heap on (score asc, path desc) so the smallest "best-ish"
            // element pops first and gets evicted when the heap overflows.
            self.score
                .partial_cmp(&other.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| other.path.cmp(&self.path))
        }
    }
    impl PartialOrd for Scored {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
    for (doc_id, (score, terms)) in running {
        let Some((path, _)) = doc_cache.get(&doc_id).cloned().flatten() else { continue };
        let mut matched_terms: Vec<String> = terms.into_iter().collect();
        matched_terms.sort();
        heap.push(Reverse(Scored { score, path, doc_id, matched_terms }));
        if heap.len() > opts.k {
            heap.pop();
        }
    }

    let mut hits: Vec<Hit> = heap
        .into_iter()
        .map(|Reverse(s)| Hit { doc_id: s.doc_id, score: s.score, path: s.path, matched_terms: s.matched_terms })
        .collect();

    hits.sort_by(|a, b| {
        b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.path.cmp(&b.path))
    });

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{index, IndexMode, IndexOptions, NullProgressSink};
    use crate::store::Store;
    use tempfile::tempdir;

    fn build_index(files: &[(&str, &str)]) -> (tempfile::TempDir, Store) {
        let root = tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(root.path().join(name), content).unwrap();
        }
        let store_dir = tempdir().unwrap();
        let mut store = Store::open(&store_dir.path().join("sx.db")).unwrap();
        let opts = IndexOptions::new(root.path().to_path_buf());
        index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        std::mem::forget(store_dir); // keep the backing file alive for the test
        (root, store)
    }

    #[test]
    fn higher_tf_ranks_first() {
        let (_root, store) = build_index(&[("a.txt", "hello world"), ("b.txt", "hello hello")]);
        let hits = search(&store, "hello", &TokenizerOptions::default(), &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "b.txt");
        assert_eq!(hits[1].path, "a.txt");
        assert!(hits[0].score > 0.0 && hits[1].score > 0.0);
    }

    #[test]
    fn path_boost_outranks_equal_tf() {
        let (_root, store) =
            build_index(&[("src/cluster/mod.rs", "slots"), ("other/mod.rs", "slots")]);
        let boosted = SearchOptions { path_boost: 1.5, ..SearchOptions::default() };
        let hits = search(&store, "cluster", &TokenizerOptions::default(), &boosted).unwrap();
        // "cluster" only appears in the first file's path, not either body —
        // path-only matches are not synthesized, so this yields no hits.
        assert!(hits.is_empty());

        let hits = search(&store, "slots", &TokenizerOptions::default(), &boosted).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn path_boost_flips_order_when_term_in_path_and_body() {
        let (_root, store) = build_index(&[
            ("auth/token.rs", "token"),
            ("misc.rs", "token token"),
        ]);
        let boosted = SearchOptions { path_boost: 1.5, ..SearchOptions::default() };
        let hits = search(&store, "token", &TokenizerOptions::default(), &boosted).unwrap();
        assert_eq!(hits[0].path, "auth/token.rs");

        let unboosted = SearchOptions { path_boost: 1.0, ..SearchOptions::default() };
        let hits = search(&store, "token", &TokenizerOptions::default(), &unboosted).unwrap();
        assert_eq!(hits[0].path, "misc.rs");
    }

    #[test]
    fn empty_term_set_returns_empty() {
        let (_root, store) = build_index(&[("a.txt", "hello")]);
        let hits = search(&store, "", &TokenizerOptions::default(), &SearchOptions::default()).unwrap();
        assert!(hits.is_empty());
    }
}

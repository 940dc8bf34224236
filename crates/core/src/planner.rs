//! Parses a raw query string into alternative groups of term IDs.
//!
//! `|` is a top-level, unescaped alternation: each alternative is both
//! tokenized with the index's own `TokenizerOptions` and tried as a regex
//! over the terms table, and the two results are unioned. A regex compile
//! failure drops only the regex augmentation for that alternative — never
//! the whole query.

use crate::store::Store;
use crate::tokenizer::{self, TokenizerOptions};
use std::collections::HashSet;

pub type AlternativeGroup = HashSet<i64>;

/// Plan a query against the open store, returning one group per `|`-
/// separated alternative. The union of all groups is the effective term
/// set used by the ranker.
pub fn plan(store: &Store, query: &str, opts: &TokenizerOptions) -> Vec<AlternativeGroup> {
    query
        .split('|')
        .map(|alt| {
            let mut group: AlternativeGroup = HashSet::new();

            for term in tokenizer::tokenize(alt, opts) {
                if let Ok(Some(term_id)) = store.lookup_term(&term) {
                    group.insert(term_id);
                }
            }

            match store.match_terms_regex(alt.trim()) {
                Ok(ids) => group.extend(ids),
                Err(e) => {
                    tracing::warn!(alternative = alt, error = %e, "regex augmentation skipped");
                }
            }

            group
        })
        .collect()
}

/// Union every alternative group into the effective term set.
pub fn union(groups: &[AlternativeGroup]) -> HashSet<i64> {
    groups.iter().flat_map(|g| g.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn store_with_term(term: &str) -> Store {
        let dir = tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("sx.db")).unwrap();
        {
            let w = store.begin().unwrap();
            let doc_id = w.upsert_document("a.txt", 1.0, 10, 1).unwrap();
            let term_id = w.intern_term(term).unwrap();
            let mut postings = HashMap::new();
            postings.insert(term_id, 1);
            w.write_postings(doc_id, &postings).unwrap();
            w.commit().unwrap();
        }
        store
    }

    #[test]
    fn single_alternative_resolves_term() {
        let store = store_with_term("cluster");
        let groups = plan(&store, "cluster", &TokenizerOptions::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(union(&groups).len(), 1);
    }

    #[test]
    fn alternation_produces_multiple_groups() {
        let store = store_with_term("cluster");
        let groups = plan(&store, "cluster|slots", &TokenizerOptions::default());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn bad_regex_does_not_fail_the_whole_query() {
        let store = store_with_term("cluster");
        let groups = plan(&store, "cluster|(unterminated[", &TokenizerOptions::default());
        assert_eq!(groups.len(), 2);
        assert!(!union(&groups).is_empty());
    }
}

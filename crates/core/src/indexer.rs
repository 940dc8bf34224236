//! Orchestrates one index run: scan, diff against stored metadata, parse
//! changed files in parallel, and commit everything on the calling thread.
//!
//! The split mirrors `codescope-server::scan::scan_files`'s
//! parallel-walk-then-rayon-map shape, but writes go through a single
//! `Store::begin()` transaction instead of an in-memory map, because the
//! `df`/`N`/`Σℓ` bookkeeping cannot be parallelized without losing
//! atomicity.

use crate::error::{Error, Result};
use crate::scanner::{self, ScanConfig};
use crate::store::Store;
use crate::tokenizer::{self, TokenizerOptions};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Full,
    Incremental,
}

/// Receives `(files_done, files_total, current_path)` progress triples.
/// The indexer must work fine with [`NullProgressSink`].
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, _files_done: usize, _files_total: usize, _current_path: &Path) {}
    fn on_file_error(&self, _path: &Path, _error: &Error) {}
}

pub struct NullProgressSink;
impl ProgressSink for NullProgressSink {}

pub struct IndexOptions {
    pub tokenizer: TokenizerOptions,
    pub scan: ScanConfig,
    /// Worker pool width; `0` means `std::thread::available_parallelism()`.
    pub workers: usize,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl IndexOptions {
    pub fn new(root: PathBuf) -> Self {
        Self {
            tokenizer: TokenizerOptions::default(),
            scan: ScanConfig::new(root),
            workers: 0,
            cancel: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    pub errors: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

struct ParsedFile {
    rel_path: String,
    mtime: f64,
    size: i64,
    terms: HashMap<String, i64>,
    length: i64,
}

fn file_mtime_secs(meta: &std::fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn parse_one(abs_path: &Path, rel_path: &str, opts: &TokenizerOptions) -> Result<ParsedFile> {
    let meta = std::fs::metadata(abs_path)
        .map_err(|source| Error::FileReadError { path: abs_path.to_path_buf(), source })?;
    let content = std::fs::read_to_string(abs_path)
        .map_err(|source| Error::FileReadError { path: abs_path.to_path_buf(), source })?;

    let tokens = tokenizer::tokenize(&content, opts);
    let mut terms: HashMap<String, i64> = HashMap::new();
    for t in &tokens {
        *terms.entry(t.clone()).or_insert(0) += 1;
    }

    Ok(ParsedFile {
        rel_path: rel_path.to_string(),
        mtime: file_mtime_secs(&meta),
        size: meta.len() as i64,
        length: tokens.len() as i64,
        terms,
    })
}

/// Run one indexing pass: deletions, change detection, parallel parse,
/// serialized commit.
pub fn index(
    store: &mut Store,
    opts: &IndexOptions,
    mode: IndexMode,
    progress: &dyn ProgressSink,
) -> Result<IndexReport> {
    let mut report = IndexReport::default();

    let root = opts.scan.root.clone();
    let candidates = scanner::scan(&opts.scan);
    let rel_of = |abs: &Path| -> String {
        abs.strip_prefix(&root).unwrap_or(abs).to_string_lossy().replace('\\', "/")
    };
    let candidate_set: std::collections::HashMap<String, PathBuf> =
        candidates.iter().map(|p| (rel_of(p), p.clone())).collect();

    // All store reads happen before `begin()` takes `&mut store` — SQLite's
    // own transaction isolation means nothing changes underneath us between
    // here and the commit below, since we are the sole writer.
    let existing_paths =
        if mode == IndexMode::Full { std::collections::HashSet::new() } else { store.all_doc_paths()? };

    let mut to_parse: Vec<(PathBuf, String)> = Vec::new();
    let mut unchanged = 0usize;
    if mode == IndexMode::Incremental {
        for (rel, abs) in &candidate_set {
            let prior = store.get_doc_meta(rel)?;
            let current_meta = std::fs::metadata(abs).ok();
            let changed = match (&prior, &current_meta) {
                (None, _) => true,
                (Some(p), Some(m)) => {
                    (p.mtime - file_mtime_secs(m)).abs() > f64::EPSILON || p.size != m.len() as i64
                }
                (Some(_), None) => false,
            };
            if changed {
                to_parse.push((abs.clone(), rel.clone()));
            } else {
                unchanged += 1;
            }
        }
    } else {
        to_parse.extend(candidate_set.iter().map(|(rel, abs)| (abs.clone(), rel.clone())));
    }
    report.files_unchanged = unchanged;

    let stale_doc_ids: Vec<i64> = {
        let candidate_paths: std::collections::HashSet<&String> = candidate_set.keys().collect();
        let mut ids = Vec::new();
        for path in existing_paths.iter().filter(|p| !candidate_paths.contains(p)) {
            if let Some(meta) = store.get_doc_meta(path)? {
                ids.push(meta.doc_id);
            }
        }
        ids
    };

    let writer = store.begin()?;
    if mode == IndexMode::Full {
        writer.truncate_all()?;
    }
    for doc_id in &stale_doc_ids {
        writer.delete_document(*doc_id)?;
        report.files_deleted += 1;
    }

    let total = to_parse.len();
    let tokenizer_opts = opts.tokenizer;
    let run_parse = || -> Vec<(String, Result<ParsedFile>)> {
        to_parse
            .par_iter()
            .map(|(abs, rel)| (rel.clone(), parse_one(abs, rel, &tokenizer_opts)))
            .collect()
    };

    let parsed = if opts.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.workers)
            .build()
            .map_err(|e| Error::UsageError { detail: e.to_string() })?;
        pool.install(run_parse)
    } else {
        run_parse()
    };

    for (done, (rel, result)) in parsed.into_iter().enumerate() {
        progress.on_progress(done + 1, total, Path::new(&rel));

        if let Some(cancel) = &opts.cancel {
            if cancel.load(Ordering::SeqCst) {
                writer.rollback()?;
                report.cancelled = true;
                return Ok(report);
            }
        }

        match result {
            Ok(parsed) => {
                let doc_id =
                    writer.upsert_document(&parsed.rel_path, parsed.mtime, parsed.size, parsed.length)?;
                let mut postings = HashMap::new();
                for (term, tf) in &parsed.terms {
                    let term_id = writer.intern_term(term)?;
                    postings.insert(term_id, *tf);
                }
                writer.write_postings(doc_id, &postings)?;
                report.files_indexed += 1;
            }
            Err(err) => {
                progress.on_file_error(Path::new(&rel), &err);
                report.errors.push((PathBuf::from(rel), err.to_string()));
            }
        }
    }

    writer.set_meta("indexed_root", &root.to_string_lossy())?;
    writer.set_meta("opt_stem", if opts.tokenizer.stem { "true" } else { "false" })?;
    writer.set_meta("opt_stopwords", if opts.tokenizer.stopwords { "true" } else { "false" })?;
    writer.commit()?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &Path) -> Store {
        Store::open(&dir.join("sx.db")).unwrap()
    }

    #[test]
    fn incremental_reindex_is_idempotent() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "hello world").unwrap();
        let store_dir = tempdir().unwrap();
        let mut store = open_store(store_dir.path());
        let opts = IndexOptions::new(root.path().to_path_buf());

        index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        let (n1, len1) = store.globals().unwrap();

        index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        let (n2, len2) = store.globals().unwrap();

        assert_eq!((n1, len1), (n2, len2));
    }

    #[test]
    fn full_matches_incremental_from_scratch() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "hello world").unwrap();
        std::fs::write(root.path().join("b.txt"), "hello hello").unwrap();
        let opts = IndexOptions::new(root.path().to_path_buf());

        let dir_a = tempdir().unwrap();
        let mut store_a = open_store(dir_a.path());
        index(&mut store_a, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();

        let dir_b = tempdir().unwrap();
        let mut store_b = open_store(dir_b.path());
        index(&mut store_b, &opts, IndexMode::Full, &NullProgressSink).unwrap();

        assert_eq!(store_a.globals().unwrap(), store_b.globals().unwrap());
    }

    #[test]
    fn deletion_decrements_doc_count() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(root.path().join("b.txt"), "beta").unwrap();
        let store_dir = tempdir().unwrap();
        let mut store = open_store(store_dir.path());
        let opts = IndexOptions::new(root.path().to_path_buf());

        index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        assert_eq!(store.globals().unwrap().0, 2);

        std::fs::remove_file(root.path().join("b.txt")).unwrap();
        index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        assert_eq!(store.globals().unwrap().0, 1);
        assert!(store.lookup_term("beta").map(|t| t.is_none()).unwrap_or(true)
            || store.term_df(store.lookup_term("beta").unwrap().unwrap()).unwrap() == 0);
    }

    #[test]
    fn empty_document_is_indexed_with_zero_length() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("x.md"), "").unwrap();
        let store_dir = tempdir().unwrap();
        let mut store = open_store(store_dir.path());
        let opts = IndexOptions::new(root.path().to_path_buf());

        index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        let meta = store.get_doc_meta("x.md").unwrap().unwrap();
        assert_eq!(meta.length, 0);

        // Second pass should leave it untouched (unchanged, not reparsed).
        let report = index(&mut store, &opts, IndexMode::Incremental, &NullProgressSink).unwrap();
        assert_eq!(report.files_unchanged, 1);
    }
}

//! Persistent inverted-index store, backed by a single SQLite file.
//!
//! Grounded on the `rusqlite::Connection` wrapper pattern used by
//! `mkb-index::IndexManager` and `codegraph-storage`'s SQLite adapter:
//! open-or-create, create schema if absent, expose narrow typed methods
//! instead of leaking SQL to callers.

use crate::error::{Error, Result};
use crate::tokenizer::TokenizerOptions;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS docs (
    doc_id INTEGER PRIMARY KEY,
    path   TEXT NOT NULL UNIQUE,
    mtime  REAL NOT NULL,
    size   INTEGER NOT NULL,
    length INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS terms (
    term_id INTEGER PRIMARY KEY,
    term    TEXT NOT NULL UNIQUE,
    df      INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS postings (
    term_id INTEGER NOT NULL REFERENCES terms(term_id),
    doc_id  INTEGER NOT NULL REFERENCES docs(doc_id),
    tf      INTEGER NOT NULL,
    PRIMARY KEY (term_id, doc_id)
);
CREATE INDEX IF NOT EXISTS postings_doc_id_idx ON postings(doc_id);
"#;

#[derive(Debug, Clone, Copy)]
pub struct DocMeta {
    pub doc_id: i64,
    pub mtime: f64,
    pub size: i64,
    pub length: i64,
}

/// Durable, transactional handle onto the on-disk index.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open or create the store at `path`, running schema setup if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|source| Error::StoreUnavailable { path: path.to_path_buf(), source })?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|source| Error::StoreUnavailable { path: path.to_path_buf(), source })?;

        let store = Self { conn, path: path.to_path_buf() };
        store.check_or_init_version()?;
        Ok(store)
    }

    /// Classify a raw SQLite failure against this store using its real path.
    fn wrap(&self, source: rusqlite::Error) -> Error {
        Error::from_sqlite(&self.path, source)
    }

    fn check_or_init_version(&self) -> Result<()> {
        match self.get_meta("schema_version")? {
            None => {
                self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?;
                self.set_meta("n_docs", "0")?;
                self.set_meta("sum_len", "0")?;
                Ok(())
            }
            Some(v) => {
                let version: i64 = v.parse().map_err(|_| Error::StoreCorrupt {
                    path: self.path.clone(),
                    detail: format!("unreadable schema_version {v:?}"),
                })?;
                if version != SCHEMA_VERSION {
                    return Err(Error::StoreCorrupt {
                        path: self.path.clone(),
                        detail: format!(
                            "schema version {version} does not match {SCHEMA_VERSION}; rebuild with --full"
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| self.wrap(e))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO meta(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| self.wrap(e))?;
        Ok(())
    }

    pub fn tokenizer_options(&self) -> Result<Option<TokenizerOptions>> {
        let stem = self.get_meta("opt_stem")?;
        let stopwords = self.get_meta("opt_stopwords")?;
        match (stem, stopwords) {
            (Some(s), Some(w)) => Ok(Some(TokenizerOptions { stem: s == "true", stopwords: w == "true" })),
            _ => Ok(None),
        }
    }

    pub fn indexed_root(&self) -> Result<Option<String>> {
        self.get_meta("indexed_root")
    }

    /// `(N, sum_len)` — the document count and total document length.
    pub fn globals(&self) -> Result<(i64, i64)> {
        let n: i64 = self.get_meta("n_docs")?.and_then(|v| v.parse().ok()).unwrap_or(0);
        let sum_len: i64 = self.get_meta("sum_len")?.and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok((n, sum_len))
    }

    pub fn get_doc_meta(&self, path: &str) -> Result<Option<DocMeta>> {
        self.conn
            .query_row(
                "SELECT doc_id, mtime, size, length FROM docs WHERE path = ?1",
                params![path],
                |row| {
                    Ok(DocMeta {
                        doc_id: row.get(0)?,
                        mtime: row.get(1)?,
                        size: row.get(2)?,
                        length: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|e| self.wrap(e))
    }

    pub fn get_doc(&self, doc_id: i64) -> Result<Option<(String, i64)>> {
        self.conn
            .query_row("SELECT path, length FROM docs WHERE doc_id = ?1", params![doc_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(|e| self.wrap(e))
    }

    pub fn all_doc_paths(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM docs").map_err(|e| self.wrap(e))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(|e| self.wrap(e))?;
        let mut out = HashSet::new();
        for r in rows {
            out.insert(r.map_err(|e| self.wrap(e))?);
        }
        Ok(out)
    }

    pub fn lookup_term(&self, term: &str) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT term_id FROM terms WHERE term = ?1", params![term], |row| row.get(0))
            .optional()
            .map_err(|e| self.wrap(e))
    }

    pub fn term_df(&self, term_id: i64) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT df FROM terms WHERE term_id = ?1", params![term_id], |row| row.get(0))
            .optional()
            .map_err(|e| self.wrap(e))?
            .unwrap_or(0))
    }

    pub fn term_text(&self, term_id: i64) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT term FROM terms WHERE term_id = ?1", params![term_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| self.wrap(e))
    }

    pub fn iter_postings(&self, term_id: i64) -> Result<Vec<(i64, i64)>> {
        let mut stmt =
            self.conn.prepare("SELECT doc_id, tf FROM postings WHERE term_id = ?1").map_err(|e| self.wrap(e))?;
        let rows = stmt
            .query_map(params![term_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| self.wrap(e))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(|e| self.wrap(e))?);
        }
        Ok(out)
    }

    /// Treat `pattern` as a regex over term text; a compile failure is
    /// reported as `Error::BadQuery`, letting the planner drop it silently.
    pub fn match_terms_regex(&self, pattern: &str) -> Result<HashSet<i64>> {
        let re = regex::Regex::new(pattern).map_err(|source| Error::BadQuery {
            alternative: pattern.to_string(),
            source,
        })?;
        let mut stmt = self.conn.prepare("SELECT term_id, term FROM terms").map_err(|e| self.wrap(e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| self.wrap(e))?;
        let mut out = HashSet::new();
        for r in rows {
            let (term_id, term) = r.map_err(|e| self.wrap(e))?;
            if re.is_match(&term) {
                out.insert(term_id);
            }
        }
        Ok(out)
    }

    /// Begin a write transaction. Only one should be open at a time — the
    /// single-writer-thread rule is enforced by the caller, not the type
    /// system, matching the design's "mandatory serialization" note.
    pub fn begin(&mut self) -> Result<IndexWriter<'_>> {
        let path = self.path.clone();
        let txn = self.conn.transaction().map_err(|e| Error::from_sqlite(&path, e))?;
        Ok(IndexWriter { txn, path })
    }
}

/// A single index-run transaction: truncate (full mode only), per-document
/// upserts and posting rewrites, then one commit.
pub struct IndexWriter<'c> {
    txn: rusqlite::Transaction<'c>,
    path: PathBuf,
}

impl<'c> IndexWriter<'c> {
    /// Classify a raw SQLite failure against this transaction's store path.
    fn wrap(&self, source: rusqlite::Error) -> Error {
        Error::from_sqlite(&self.path, source)
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.txn
            .execute_batch(
                "DELETE FROM postings; DELETE FROM docs; DELETE FROM terms;
             UPDATE meta SET value = '0' WHERE key IN ('n_docs', 'sum_len');",
            )
            .map_err(|e| self.wrap(e))?;
        Ok(())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.txn
            .execute(
                "INSERT INTO meta(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| self.wrap(e))?;
        Ok(())
    }

    fn get_i64_meta(&self, key: &str) -> Result<i64> {
        Ok(self
            .txn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| self.wrap(e))?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    fn add_i64_meta(&self, key: &str, delta: i64) -> Result<()> {
        let current = self.get_i64_meta(key)?;
        self.set_meta(key, &(current + delta).to_string())
    }

    /// Insert or update a document row, adjusting `N`/`Σℓ` as needed.
    /// Returns the document's `doc_id`.
    pub fn upsert_document(&self, path: &str, mtime: f64, size: i64, length: i64) -> Result<i64> {
        let existing: Option<(i64, i64)> = self
            .txn
            .query_row("SELECT doc_id, length FROM docs WHERE path = ?1", params![path], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()
            .map_err(|e| self.wrap(e))?;

        match existing {
            Some((doc_id, old_length)) => {
                self.txn
                    .execute(
                        "UPDATE docs SET mtime = ?1, size = ?2, length = ?3 WHERE doc_id = ?4",
                        params![mtime, size, length, doc_id],
                    )
                    .map_err(|e| self.wrap(e))?;
                self.add_i64_meta("sum_len", length - old_length)?;
                Ok(doc_id)
            }
            None => {
                self.txn
                    .execute(
                        "INSERT INTO docs(path, mtime, size, length) VALUES (?1, ?2, ?3, ?4)",
                        params![path, mtime, size, length],
                    )
                    .map_err(|e| self.wrap(e))?;
                let doc_id = self.txn.last_insert_rowid();
                self.add_i64_meta("n_docs", 1)?;
                self.add_i64_meta("sum_len", length)?;
                Ok(doc_id)
            }
        }
    }

    /// Cascading delete: postings, term `df`, and the document row, with
    /// `N`/`Σℓ` adjusted to match.
    pub fn delete_document(&self, doc_id: i64) -> Result<()> {
        let length: Option<i64> = self
            .txn
            .query_row("SELECT length FROM docs WHERE doc_id = ?1", params![doc_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| self.wrap(e))?;
        let Some(length) = length else { return Ok(()) };

        let mut stmt =
            self.txn.prepare("SELECT term_id FROM postings WHERE doc_id = ?1").map_err(|e| self.wrap(e))?;
        let term_ids: Vec<i64> = stmt
            .query_map(params![doc_id], |row| row.get(0))
            .map_err(|e| self.wrap(e))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| self.wrap(e))?;
        drop(stmt);
        for term_id in term_ids {
            self.txn
                .execute("UPDATE terms SET df = df - 1 WHERE term_id = ?1", params![term_id])
                .map_err(|e| self.wrap(e))?;
        }

        self.txn.execute("DELETE FROM postings WHERE doc_id = ?1", params![doc_id]).map_err(|e| self.wrap(e))?;
        self.txn.execute("DELETE FROM docs WHERE doc_id = ?1", params![doc_id]).map_err(|e| self.wrap(e))?;
        self.add_i64_meta("n_docs", -1)?;
        self.add_i64_meta("sum_len", -length)?;
        Ok(())
    }

    /// Idempotent term interning.
    pub fn intern_term(&self, term: &str) -> Result<i64> {
        self.txn
            .execute(
                "INSERT INTO terms(term, df) VALUES (?1, 0) ON CONFLICT(term) DO NOTHING",
                params![term],
            )
            .map_err(|e| self.wrap(e))?;
        self.txn
            .query_row("SELECT term_id FROM terms WHERE term = ?1", params![term], |row| row.get(0))
            .map_err(|e| self.wrap(e))
    }

    /// Replace all postings for `doc_id` with `postings`, updating `df` for
    /// terms that newly appear in or disappear from this document.
    pub fn write_postings(&self, doc_id: i64, postings: &HashMap<i64, i64>) -> Result<()> {
        let mut stmt =
            self.txn.prepare("SELECT term_id FROM postings WHERE doc_id = ?1").map_err(|e| self.wrap(e))?;
        let old_terms: HashSet<i64> = stmt
            .query_map(params![doc_id], |row| row.get(0))
            .map_err(|e| self.wrap(e))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| self.wrap(e))?;
        drop(stmt);

        let new_terms: HashSet<i64> = postings.keys().copied().collect();

        for term_id in new_terms.difference(&old_terms) {
            self.txn
                .execute("UPDATE terms SET df = df + 1 WHERE term_id = ?1", params![term_id])
                .map_err(|e| self.wrap(e))?;
        }
        for term_id in old_terms.difference(&new_terms) {
            self.txn
                .execute("UPDATE terms SET df = df - 1 WHERE term_id = ?1", params![term_id])
                .map_err(|e| self.wrap(e))?;
        }

        self.txn.execute("DELETE FROM postings WHERE doc_id = ?1", params![doc_id]).map_err(|e| self.wrap(e))?;
        for (term_id, tf) in postings {
            self.txn
                .execute(
                    "INSERT INTO postings(term_id, doc_id, tf) VALUES (?1, ?2, ?3)",
                    params![term_id, doc_id, tf],
                )
                .map_err(|e| self.wrap(e))?;
        }
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.txn.commit().map_err(|source| Error::StoreUnavailable { path: self.path, source })
    }

    pub fn rollback(self) -> Result<()> {
        self.txn.rollback().map_err(|source| Error::StoreUnavailable { path: self.path, source })
    }
}

//! Typed error hierarchy shared by every engine component.
//!
//! Mirrors the error kinds the design calls for: a store that can't be
//! opened is a different failure from a single file that can't be read,
//! and callers (the CLI shell) need to tell them apart to pick exit codes.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open index store at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("index store at {path} is corrupt or has an incompatible schema: {detail}")]
    StoreCorrupt { path: PathBuf, detail: String },

    #[error("failed to read {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no index found; run `sx index` first")]
    EmptyIndex,

    #[error("bad query alternative {alternative:?}: {source}")]
    BadQuery {
        alternative: String,
        #[source]
        source: regex::Error,
    },

    #[error("usage error: {detail}")]
    UsageError { detail: String },
}

impl Error {
    /// Classify a raw SQLite failure encountered against an already-open
    /// store. `StoreCorrupt` is reserved for the schema/version checks
    /// `Store::check_or_init_version` performs explicitly; a query or write
    /// failing after that point (lock contention, disk full, a constraint
    /// violation) means the store became unavailable, not that its on-disk
    /// format is broken, so it is reported with the real path rather than
    /// guessed at by a context-free blanket conversion.
    pub(crate) fn from_sqlite(path: &Path, source: rusqlite::Error) -> Self {
        Error::StoreUnavailable { path: path.to_path_buf(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

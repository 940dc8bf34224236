//! Local full-text search engine core: tokenizer, scanner, persistent
//! index store, indexer, query planner, BM25 ranker, and snippet builder.

pub mod error;
pub mod indexer;
pub mod planner;
pub mod ranker;
pub mod scanner;
pub mod snippet;
pub mod store;
pub mod tokenizer;

pub use error::{Error, Result};
pub use indexer::{index, IndexMode, IndexOptions, IndexReport, NullProgressSink, ProgressSink};
pub use ranker::{search, Hit, SearchOptions};
pub use scanner::ScanConfig;
pub use snippet::Snippet;
pub use store::Store;
pub use tokenizer::TokenizerOptions;

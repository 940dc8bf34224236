//! `sx` — command-line front end for the local code search engine.
//!
//! Calls `sx_core` directly with no server or daemon in between.

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sx_core::indexer::{self, IndexMode, IndexOptions, ProgressSink};
use sx_core::ranker::{self, SearchOptions};
use sx_core::store::Store;
use sx_core::tokenizer::TokenizerOptions;
use sx_core::{snippet, Error};

const KNOWN_SUBCOMMANDS: &[&str] = &["index", "search", "status", "help"];

/// `sx` — fast local code search, no server required.
#[derive(Parser)]
#[command(name = "sx", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the persistent index store
    #[arg(long, global = true, default_value = "sx.db")]
    index: PathBuf,

    /// Number of results to return
    #[arg(long, global = true, default_value = "10")]
    k: usize,

    /// BM25 k1 parameter
    #[arg(long = "k1", global = true, default_value = "1.2")]
    k1: f64,

    /// BM25 b parameter
    #[arg(long, global = true, default_value = "0.75")]
    b: f64,

    /// Score multiplier applied when a matched term also occurs in the file's path
    #[arg(long, global = true, default_value = "1.5")]
    path_boost: f64,

    /// Enable light stemming at index time
    #[arg(long, global = true)]
    stem: bool,

    /// Disable stopword removal at index time
    #[arg(long, global = true)]
    no_stopwords: bool,

    /// Keep only hits whose path contains this substring
    #[arg(long, global = true)]
    path: Option<String>,

    /// Keep only hits with one of these extensions, e.g. ".rs,.toml"
    #[arg(long, global = true)]
    ext: Option<String>,

    /// Emit machine-readable JSON instead of a text table
    #[arg(long, global = true)]
    json: bool,

    /// Show a matching line alongside each hit
    #[arg(long, global = true)]
    snippet: bool,

    /// Force ANSI color even when stdout is not a terminal
    #[arg(long, global = true)]
    color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the index for a directory tree
    Index {
        /// Directory to index (default: current directory)
        root: Option<PathBuf>,

        /// Discard the existing index and rebuild from scratch
        #[arg(long)]
        full: bool,

        /// Worker thread count (default: available parallelism)
        #[arg(long, default_value = "0")]
        workers: usize,

        /// Suppress per-file progress output
        #[arg(long)]
        no_progress: bool,

        /// Write the store to this path instead of --index
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Search the index
    Search {
        /// Query text; `|` separates alternatives
        query: String,

        /// Shorthand for --path, when given as a bare second positional
        path_arg: Option<String>,
    },
    /// Report index statistics
    Status,
}

/// `sx "query" path/` is shorthand for `sx search "query" --path path/`; and
/// any first argument that isn't a known subcommand or flag is treated as an
/// implicit search query.
fn normalize_args(args: Vec<String>) -> Vec<String> {
    let Some(first) = args.get(1) else { return args };
    if KNOWN_SUBCOMMANDS.contains(&first.as_str()) || first.starts_with('-') {
        return args;
    }
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(args[0].clone());
    out.push("search".to_string());
    out.extend(args.into_iter().skip(1));
    out
}

struct CliProgress {
    quiet: bool,
}

impl ProgressSink for CliProgress {
    fn on_progress(&self, files_done: usize, files_total: usize, current_path: &Path) {
        if !self.quiet {
            eprint!("\rindexing {files_done}/{files_total}: {}          ", current_path.display());
        }
    }

    fn on_file_error(&self, path: &Path, error: &Error) {
        tracing::warn!(path = %path.display(), error = %error, "skipped file");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("sx=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let args = normalize_args(std::env::args().collect());
    let cli = Cli::parse_from(args);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Maps a top-level failure to the exit codes documented for the engine's
/// error kinds; anything not one of those (flag parsing, filesystem
/// surprises outside the store) falls back to a generic I/O failure code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(Error::UsageError { .. }) => 1,
        Some(_) => 2,
        None => 2,
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Index { ref root, full, workers, no_progress, ref out } => {
            run_index(&cli, root.clone(), full, workers, no_progress, out.clone())
        }
        Commands::Search { ref query, ref path_arg } => run_search(&cli, query.clone(), path_arg.clone()),
        Commands::Status => run_status(&cli),
    }
}

fn run_index(
    cli: &Cli,
    root: Option<PathBuf>,
    full: bool,
    workers: usize,
    no_progress: bool,
    out: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let root = root
        .unwrap_or_else(|| PathBuf::from("."))
        .canonicalize()
        .context("resolving index root")?;
    let store_path = out.unwrap_or_else(|| cli.index.clone());

    let mut store = Store::open(&store_path)
        .with_context(|| format!("opening store at {}", store_path.display()))?;

    let mut opts = IndexOptions::new(root);
    opts.tokenizer = TokenizerOptions { stem: cli.stem, stopwords: !cli.no_stopwords };
    opts.workers = workers;

    let mode = if full { IndexMode::Full } else { IndexMode::Incremental };
    let progress = CliProgress { quiet: no_progress };
    let report = indexer::index(&mut store, &opts, mode, &progress)?;
    if !no_progress {
        eprintln!();
    }

    if cli.json {
        let out = serde_json::json!({
            "files_indexed": report.files_indexed,
            "files_deleted": report.files_deleted,
            "files_unchanged": report.files_unchanged,
            "errors": report.errors.iter().map(|(p, e)| serde_json::json!({"path": p, "error": e})).collect::<Vec<_>>(),
            "cancelled": report.cancelled,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "indexed {} file(s), deleted {}, unchanged {}{}",
            report.files_indexed,
            report.files_deleted,
            report.files_unchanged,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        if !report.errors.is_empty() {
            eprintln!("{} file(s) skipped due to errors", report.errors.len());
        }
    }

    Ok(ExitCode::from(0))
}

fn run_search(cli: &Cli, query: String, path_arg: Option<String>) -> anyhow::Result<ExitCode> {
    let store = Store::open(&cli.index)
        .with_context(|| format!("opening store at {}", cli.index.display()))?;

    let tokenizer_opts = store.tokenizer_options()?.unwrap_or_default();
    if tokenizer_opts.stem != cli.stem || tokenizer_opts.stopwords != !cli.no_stopwords {
        tracing::warn!("ignoring --stem/--no-stopwords: using the options the index was built with");
    }

    let path_filter = cli.path.clone().or(path_arg);
    let ext_filter: Option<HashSet<String>> = cli.ext.as_ref().map(|raw| {
        raw.split(',')
            .map(|s| {
                let s = s.trim();
                if s.starts_with('.') { s.to_string() } else { format!(".{s}") }
            })
            .collect()
    });

    let search_opts = SearchOptions {
        k: cli.k,
        k1: cli.k1,
        b: cli.b,
        path_boost: cli.path_boost,
        path_filter,
        ext_filter,
    };

    let hits = ranker::search(&store, &query, &tokenizer_opts, &search_opts)?;

    if cli.json {
        let items: Vec<serde_json::Value> = hits
            .iter()
            .map(|h| {
                let (line, text) = if cli.snippet {
                    snippet_for(&store, h, &tokenizer_opts)
                } else {
                    (None, None)
                };
                serde_json::json!({
                    "path": h.path,
                    "score": h.score,
                    "line": line,
                    "snippet": text,
                    "terms": h.matched_terms,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        if hits.is_empty() {
            eprintln!("no results for '{query}'");
            return Ok(ExitCode::from(0));
        }
        for h in &hits {
            if cli.color {
                println!("{:<60} {:>8.3}", h.path.cyan(), h.score);
            } else {
                println!("{:<60} {:>8.3}", h.path, h.score);
            }
            if cli.snippet {
                let (line, text) = snippet_for(&store, h, &tokenizer_opts);
                if let (Some(line), Some(text)) = (line, text) {
                    println!("    {:>5}: {}", line, text.trim());
                }
            }
        }
        eprintln!("\n{} result(s)", hits.len());
    }

    Ok(ExitCode::from(0))
}

fn snippet_for(store: &Store, hit: &ranker::Hit, opts: &TokenizerOptions) -> (Option<usize>, Option<String>) {
    let Ok(Some((path, _))) = store.get_doc(hit.doc_id) else { return (None, None) };
    let Some(root) = store.indexed_root().ok().flatten() else { return (None, None) };
    let abs = Path::new(&root).join(&path);
    let Ok(content) = std::fs::read_to_string(&abs) else { return (None, None) };
    let matched: HashSet<String> = hit.matched_terms.iter().cloned().collect();
    match snippet::build(&content, &matched, opts) {
        Some(s) => (Some(s.line_number), Some(s.line_text)),
        None => (None, None),
    }
}

fn run_status(cli: &Cli) -> anyhow::Result<ExitCode> {
    let store = match Store::open(&cli.index) {
        Ok(s) => s,
        Err(_) => {
            if cli.json {
                println!("{}", serde_json::json!({"indexed": false}));
            } else {
                println!("no index at {}", cli.index.display());
            }
            return Ok(ExitCode::from(3));
        }
    };

    let (n_docs, sum_len) = store.globals()?;
    if n_docs == 0 {
        if cli.json {
            println!("{}", serde_json::json!({"indexed": false}));
        } else {
            println!("index at {} is empty", cli.index.display());
        }
        return Ok(ExitCode::from(3));
    }

    let root = store.indexed_root()?.unwrap_or_default();
    let opts = store.tokenizer_options()?.unwrap_or_default();

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "indexed": true,
                "root": root,
                "n_docs": n_docs,
                "sum_len": sum_len,
                "stem": opts.stem,
                "stopwords": opts.stopwords,
            })
        );
    } else {
        println!("Root:      {root}");
        println!("Documents: {n_docs}");
        println!("Terms (Σℓ):{sum_len:>10}");
        println!("Stemming:  {}", opts.stem);
        println!("Stopwords: {}", opts.stopwords);
    }

    Ok(ExitCode::from(0))
}

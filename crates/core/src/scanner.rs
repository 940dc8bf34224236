//! Directory walk, include/exclude filtering, and binary sniffing.
//!
//! Built on the `ignore::WalkBuilder` + `rayon` parallel-walk shape already
//! used by `codescope-server::scan::walk_files_parallel`, and the
//! `ScanConfig` struct already present in `codescope-server::types`.

use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default file size ceiling: files larger than this are skipped.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Tunable, not a contract (see spec's open question on the sniff ratio).
pub(crate) const BINARY_RATIO_THRESHOLD: f32 = 0.30;

const SNIFF_BYTES: usize = 1024;

fn default_skip_dirs() -> HashSet<String> {
    [".git", "node_modules", ".venv", "__pycache__", "target", "dist", "build", ".next", "vendor"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_extensions() -> HashSet<String> {
    [
        "c", "h", "cc", "cpp", "hpp", "py", "md", "txt", "rs", "go", "js", "jsx", "ts", "tsx",
        "java", "rb", "sh", "toml", "yaml", "yml", "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_basenames() -> HashSet<String> {
    ["README", "Makefile", "Dockerfile", "LICENSE"].iter().map(|s| s.to_string()).collect()
}

/// Scan configuration — default covers common source/doc extensions; an
/// empty extension set means "all text files, subject to binary sniffing".
#[derive(Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub skip_dirs: HashSet<String>,
    pub extensions: HashSet<String>,
    pub basenames: HashSet<String>,
    pub max_file_size: u64,
}

impl ScanConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            skip_dirs: default_skip_dirs(),
            extensions: default_extensions(),
            basenames: default_basenames(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    fn is_included(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if self.basenames.contains(name) {
                return true;
            }
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.contains(ext),
            None => false,
        }
    }
}

/// Read the first kilobyte; reject files that look binary: a NUL byte
/// anywhere in the sample, or a non-printable-byte ratio above threshold.
fn looks_binary(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return true,
    };
    let mut buf = [0u8; SNIFF_BYTES];
    let n = match file.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return true,
    };
    if n == 0 {
        return false;
    }
    let sample = &buf[..n];
    if sample.contains(&0) {
        return true;
    }
    let non_printable = sample
        .iter()
        .filter(|&&b| b != b'\n' && b != b'\r' && b != b'\t' && !(0x20..0x7f).contains(&b))
        .count();
    (non_printable as f32 / n as f32) > BINARY_RATIO_THRESHOLD
}

/// Walk `config.root`, returning a deduplicated, unordered set of absolute
/// paths to candidate files.
pub fn scan(config: &ScanConfig) -> Vec<PathBuf> {
    let skip = config.skip_dirs.clone();
    let results: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

    WalkBuilder::new(&config.root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .threads(rayon::current_num_threads().min(12))
        .filter_entry(move |entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                let name = entry.file_name().to_string_lossy();
                return !skip.contains(name.as_ref());
            }
            true
        })
        .build_parallel()
        .run(|| {
            let config = &*config;
            Box::new(move |entry| {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => return ignore::WalkState::Continue,
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    return ignore::WalkState::Continue;
                }
                let path = entry.path();
                if !config.is_included(path) {
                    return ignore::WalkState::Continue;
                }
                let size = match std::fs::metadata(path) {
                    Ok(m) => m.len(),
                    Err(_) => return ignore::WalkState::Continue,
                };
                if size > config.max_file_size {
                    return ignore::WalkState::Continue;
                }
                if looks_binary(path) {
                    return ignore::WalkState::Continue;
                }
                results.lock().unwrap().push(path.to_path_buf());
                ignore::WalkState::Continue
            })
        });

    let mut out = results.into_inner().unwrap();
    out.par_sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn skips_dotgit_and_binary() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("index"), b"binary\0data").unwrap();
        std::fs::write(dir.path().join("a.rs"), b"fn main() {}").unwrap();

        let mut bin = std::fs::File::create(dir.path().join("blob.bin")).unwrap();
        bin.write_all(&[0u8; 32]).unwrap();

        let config = ScanConfig::new(dir.path().to_path_buf());
        let found = scan(&config);
        assert!(found.iter().any(|p| p.ends_with("a.rs")));
        assert!(!found.iter().any(|p| p.to_string_lossy().contains(".git")));
    }

    #[test]
    fn respects_size_ceiling() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), vec![b'a'; 64]).unwrap();
        let mut config = ScanConfig::new(dir.path().to_path_buf());
        config.extensions.clear();
        config.extensions.insert("txt".to_string());
        config.max_file_size = 16;
        let found = scan(&config);
        assert!(found.is_empty());
    }

    #[test]
    fn no_duplicates() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("x.rs"), b"fn x() {}").unwrap();
        let config = ScanConfig::new(dir.path().to_path_buf());
        let found = scan(&config);
        let mut sorted = found.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(found.len(), sorted.len());
    }
}

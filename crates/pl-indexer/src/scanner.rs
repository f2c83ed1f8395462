use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

/// Extension of chunk input files.
pub(crate) const CHUNK_EXTENSION: &str = "jsonl";

/// Result of scanning for chunk files.
pub struct ScanResult {
    /// Absolute paths, sorted so ingestion order is deterministic.
    pub files: Vec<PathBuf>,
    /// Total entries seen (including skipped).
    pub total_entries: usize,
}

/// Find chunk JSONL files under `root`.
///
/// A file path is returned as-is regardless of extension. Directories are
/// walked with the `ignore` crate: hidden entries and `.gitignore`d paths are
/// skipped and symlinks are not followed.
pub fn scan_chunk_files(root: &Path) -> ScanResult {
    if root.is_file() {
        return ScanResult {
            files: vec![root.to_path_buf()],
            total_entries: 1,
        };
    }

    let mut files = Vec::new();
    let mut total_entries = 0usize;

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        total_entries += 1;

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        if is_chunk_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    ScanResult {
        files,
        total_entries,
    }
}

fn is_chunk_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CHUNK_EXTENSION))
}

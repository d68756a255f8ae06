//! CSV file discovery
//!
//! Lists `*.csv` files directly inside a directory, sorted by file name so
//! runs over the same directory always process files in the same order.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot read directory {}: {}", .0.display(), .1)]
    Access(PathBuf, String),
}

/// Non-recursive CSV scanner
#[derive(Debug, Clone)]
pub struct CsvScanner {
    extension: String,
}

impl Default for CsvScanner {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
        }
    }
}

impl CsvScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `root` for CSV files
    ///
    /// Hidden files are skipped; the extension match ignores case.
    /// Unreadable entries are logged and skipped.
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && !is_hidden(&entry) && self.matches(&entry) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) if e.depth() == 0 => {
                    return Err(ScanError::Access(root.to_path_buf(), e.to_string()));
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!(dir = %root.display(), found = files.len(), "Scanned for CSV files");
        Ok(files)
    }

    fn matches(&self, entry: &DirEntry) -> bool {
        entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

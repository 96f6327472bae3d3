//! Image file scanner
//!
//! Walks a directory (recursively or one level deep), skips system entries
//! and symlink loops, and keeps files with a supported image extension.
//! Content is not inspected here; corrupt images fail at the Validate stage
//! so they still appear in the batch report.

use crate::models::image::has_supported_extension;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Batch root errors; the only errors that abort a whole batch
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot read directory {}: {}", .0.display(), .1)]
    Unreadable(PathBuf, String),
}

/// Image file scanner
pub struct ImageScanner {
    ignore_names: Vec<String>,
    recursive: bool,
}

impl ImageScanner {
    /// Scanner with the default ignore list
    ///
    /// Ignores system entries like .DS_Store, Thumbs.db, .git and macOS
    /// resource forks (`._*`).
    pub fn new(recursive: bool) -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "@eaDir".to_string(),
            ],
            recursive,
        }
    }

    /// Supported image files under `root_path`, sorted lexically
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        std::fs::read_dir(root_path)
            .map_err(|e| ScanError::Unreadable(root_path.to_path_buf(), e.to_string()))?;

        let mut symlink_visited = HashSet::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(root_path)
            .follow_links(true)
            .max_depth(if self.recursive { usize::MAX } else { 1 })
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && has_supported_extension(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    // Loops reported by walkdir land here too
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                }
            }
        }

        files.sort();

        tracing::debug!(
            root = %root_path.display(),
            recursive = self.recursive,
            images = files.len(),
            "Scan complete"
        );

        Ok(files)
    }

    /// Check if entry should be processed
    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        // Never filter the root itself
        if entry.depth() == 0 {
            return true;
        }

        let file_name = entry.file_name().to_string_lossy();

        if file_name.starts_with("._") || self.ignore_names.iter().any(|n| *n == file_name) {
            return false;
        }

        // Visit each linked directory once
        if entry.path_is_symlink() && entry.file_type().is_dir() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!(path = %entry.path().display(), "Symlink loop detected");
                    return false;
                }
            }
        }

        true
    }
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new(true)
    }
}

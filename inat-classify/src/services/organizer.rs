//! Sort classified images into a subfamily/tribe/genus directory tree
//!
//! `target/<subfamily>/<tribe>/<genus>/<file>`. Files in the same directory
//! whose name starts with the image's stem and a dot (raw files, XMP
//! sidecars such as `P1.ORF` or `P1.JPG.xmp`) travel with it.
//! Existing files are never overwritten.

use crate::models::{ClassificationResult, Rank};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory names for absent levels
pub const UNKNOWN_SUBFAMILY: &str = "Unknown subfamily";
pub const UNKNOWN_TRIBE: &str = "Unknown tribe";
pub const UNKNOWN_GENUS: &str = "Unknown genus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrganizeMode {
    #[default]
    Move,
    Copy,
}

/// Counts and relocations of one organize pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub moved: usize,
    /// Target already existed
    pub skipped: usize,
    pub failed: usize,
    /// (from, to) for every relocated image, sidecars excluded
    pub relocated: Vec<(PathBuf, PathBuf)>,
}

pub struct Organizer {
    target_root: PathBuf,
    mode: OrganizeMode,
}

impl Organizer {
    pub fn new(target_root: impl Into<PathBuf>, mode: OrganizeMode) -> Self {
        Self {
            target_root: target_root.into(),
            mode,
        }
    }

    /// Directory an image with this result belongs in
    pub fn target_dir(&self, result: &ClassificationResult) -> PathBuf {
        let hierarchy = result.hierarchy();
        let level = |rank: Rank, unknown: &str| match hierarchy.get(rank) {
            Some(name) => sanitize_component(name),
            None => unknown.to_string(),
        };
        self.target_root
            .join(level(Rank::Subfamily, UNKNOWN_SUBFAMILY))
            .join(level(Rank::Tribe, UNKNOWN_TRIBE))
            .join(level(Rank::Genus, UNKNOWN_GENUS))
    }

    pub fn organize(&self, results: &[ClassificationResult]) -> OrganizeReport {
        let mut report = OrganizeReport::default();
        // Other result images are never treated as sidecars
        let result_paths: HashSet<&Path> = results.iter().map(|r| r.image_path()).collect();

        for result in results {
            let source = result.image_path();
            let Some(file_name) = source.file_name() else {
                tracing::warn!(image = %source.display(), "Image path has no file name");
                report.failed += 1;
                continue;
            };

            let target_dir = self.target_dir(result);
            let target = target_dir.join(file_name);

            if target.exists() {
                tracing::warn!(
                    image = %source.display(),
                    target = %target.display(),
                    "Target already exists, not overwriting"
                );
                report.skipped += 1;
                continue;
            }

            if let Err(e) = fs::create_dir_all(&target_dir).and_then(|_| self.transfer(source, &target)) {
                tracing::warn!(image = %source.display(), error = %e, "Failed to organize image");
                report.failed += 1;
                continue;
            }

            tracing::info!(
                image = %source.display(),
                target = %target.display(),
                mode = ?self.mode,
                "Image organized"
            );

            for sidecar in sidecars(source, &result_paths) {
                let Some(name) = sidecar.file_name() else { continue };
                let sidecar_target = target_dir.join(name);
                if sidecar_target.exists() {
                    tracing::warn!(file = %sidecar.display(), "Sidecar target exists, left in place");
                    continue;
                }
                match self.transfer(&sidecar, &sidecar_target) {
                    Ok(()) => tracing::debug!(
                        file = %sidecar.display(),
                        target = %sidecar_target.display(),
                        "Sidecar organized"
                    ),
                    Err(e) => tracing::warn!(file = %sidecar.display(), error = %e, "Sidecar not organized"),
                }
            }

            report.moved += 1;
            report.relocated.push((source.to_path_buf(), target));
        }

        tracing::info!(
            target = %self.target_root.display(),
            moved = report.moved,
            skipped = report.skipped,
            failed = report.failed,
            "Organize finished"
        );

        report
    }

    fn transfer(&self, from: &Path, to: &Path) -> io::Result<()> {
        match self.mode {
            OrganizeMode::Copy => fs::copy(from, to).map(|_| ()),
            OrganizeMode::Move => match fs::rename(from, to) {
                Ok(()) => Ok(()),
                // Cross-device rename
                Err(_) => {
                    fs::copy(from, to)?;
                    fs::remove_file(from)
                }
            },
        }
    }
}

/// Files next to `image` named `<stem>.*`, e.g. `P1.ORF` and `P1.JPG.xmp` for `P1.JPG`
fn sidecars(image: &Path, result_paths: &HashSet<&Path>) -> Vec<PathBuf> {
    let (Some(dir), Some(stem)) = (image.parent(), image.file_stem()) else {
        return Vec::new();
    };
    let prefix = format!("{}.", stem.to_string_lossy());
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.as_path() != image
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(&prefix))
                && !result_paths.contains(path.as_path())
        })
        .collect();
    found.sort();
    found
}

/// Replace path separators and reject dot names
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

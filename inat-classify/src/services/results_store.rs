//! Results file
//!
//! Aggregated JSON document of a batch: successful results plus failure
//! records. Written atomically (temp file + rename) so an interrupted run
//! leaves either the previous checkpoint or the new one, never a torn file.
//!
//! A document records the directory it was produced from and whether the
//! run finished. A finished document for the same directory is reused, an
//! unfinished one is resumed, anything else is reprocessed.

use crate::error::FailureRecord;
use crate::models::{BatchReport, ClassificationResult, ImageOutcome};
use chrono::{DateTime, Utc};
use inat_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// On-disk results document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    #[serde(default)]
    pub run_id: Option<Uuid>,
    pub generated_at: DateTime<Utc>,
    /// Batch directory the results were produced from
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// False while the batch is still running (checkpoint)
    #[serde(default)]
    pub complete: bool,
    pub results: Vec<ClassificationResult>,
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
}

impl ResultsDocument {
    pub fn from_outcomes(run_id: Option<Uuid>, root: &Path, outcomes: &[ImageOutcome], complete: bool) -> Self {
        Self {
            run_id,
            generated_at: Utc::now(),
            root: Some(root.to_path_buf()),
            complete,
            results: outcomes.iter().filter_map(ImageOutcome::as_success).cloned().collect(),
            failures: outcomes
                .iter()
                .filter_map(ImageOutcome::as_failure)
                .map(FailureRecord::from)
                .collect(),
        }
    }

    pub fn from_report(report: &BatchReport) -> Self {
        Self {
            run_id: Some(report.run_id),
            generated_at: report.finished_at,
            root: Some(report.root.clone()),
            complete: !report.was_cancelled(),
            results: report.successes().cloned().collect(),
            failures: report.failure_records(),
        }
    }

    /// Every image already attempted, successful or not
    pub fn processed_paths(&self) -> HashSet<PathBuf> {
        self.results
            .iter()
            .map(|r| r.image_path().to_path_buf())
            .chain(self.failures.iter().map(|f| f.image_path.clone()))
            .collect()
    }

    /// Fold a newer document into this one
    ///
    /// Entries of `newer` replace entries for the same image; run metadata
    /// is taken from `newer`.
    pub fn merge(&mut self, newer: ResultsDocument) {
        let replaced = newer.processed_paths();
        self.results.retain(|r| !replaced.contains(r.image_path()));
        self.failures.retain(|f| !replaced.contains(&f.image_path));
        self.results.extend(newer.results);
        self.failures.extend(newer.failures);

        self.run_id = newer.run_id;
        self.generated_at = newer.generated_at;
        self.complete = newer.complete;
        if newer.root.is_some() {
            self.root = newer.root;
        }
    }

    /// Point moved images at their new location; returns how many changed
    pub fn apply_relocations(&mut self, relocations: &[(PathBuf, PathBuf)]) -> usize {
        let moves: HashMap<&Path, &Path> = relocations
            .iter()
            .map(|(from, to)| (from.as_path(), to.as_path()))
            .collect();

        let mut changed = 0;
        for result in &mut self.results {
            if let Some(to) = moves.get(result.image_path()) {
                *result = result.relocated(*to);
                changed += 1;
            }
        }
        changed
    }
}

/// What to do with an existing results file before a batch
#[derive(Debug)]
pub enum ResumePlan {
    /// No usable document; process the whole directory
    Fresh,
    /// Finished run over the same directory
    Reuse(ResultsDocument),
    /// Interrupted run over the same directory; process what is missing
    Resume(ResultsDocument),
}

pub struct ResultsStore {
    path: PathBuf,
    checkpoint_every: usize,
    /// Earlier document that new results are merged into
    previous: Option<ResultsDocument>,
}

impl ResultsStore {
    /// `checkpoint_every == 0` disables checkpoints
    pub fn new(path: impl Into<PathBuf>, checkpoint_every: usize) -> Self {
        Self {
            path: path.into(),
            checkpoint_every,
            previous: None,
        }
    }

    /// Merge every checkpoint and report into `previous`
    pub fn with_previous(mut self, previous: ResultsDocument) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Decide how a batch over `root` treats the existing file
    ///
    /// A file that cannot be parsed is an error rather than silently
    /// overwritten; `force` skips the file entirely.
    pub fn plan(&self, root: &Path, force: bool) -> Result<ResumePlan> {
        if force || !self.exists() {
            return Ok(ResumePlan::Fresh);
        }

        let document = self.load()?;
        let same_root = document
            .root
            .as_deref()
            .is_some_and(|recorded| same_directory(recorded, root));

        if !same_root {
            tracing::warn!(
                path = %self.path.display(),
                recorded = ?document.root,
                root = %root.display(),
                "Results file was produced from another directory, reprocessing"
            );
            return Ok(ResumePlan::Fresh);
        }

        if document.complete {
            tracing::info!(path = %self.path.display(), "Results file is complete, reusing it");
            Ok(ResumePlan::Reuse(document))
        } else {
            tracing::info!(
                path = %self.path.display(),
                processed = document.results.len() + document.failures.len(),
                "Results file is a checkpoint, resuming"
            );
            Ok(ResumePlan::Resume(document))
        }
    }

    /// Load a previously written document
    pub fn load(&self) -> Result<ResultsDocument> {
        let content = fs::read_to_string(&self.path)?;
        let document: ResultsDocument = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidInput(format!(
                "Results file {} is not valid: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::info!(
            path = %self.path.display(),
            results = document.results.len(),
            failures = document.failures.len(),
            complete = document.complete,
            "Loaded existing results"
        );
        Ok(document)
    }

    /// Write the document atomically
    pub fn save(&self, document: &ResultsDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(document)
            .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            results = document.results.len(),
            "Results saved"
        );
        Ok(())
    }

    /// Write the final document of a run and return it
    pub fn save_report(&self, report: &BatchReport) -> Result<ResultsDocument> {
        let document = self.merged(ResultsDocument::from_report(report));
        self.save(&document)?;
        tracing::info!(
            path = %self.path.display(),
            results = document.results.len(),
            failures = document.failures.len(),
            "Results written"
        );
        Ok(document)
    }

    /// Save a partial document every `checkpoint_every` images
    ///
    /// Returns whether a checkpoint was written. Failures are logged and
    /// never interrupt the batch.
    pub fn checkpoint(&self, root: &Path, outcomes: &[ImageOutcome]) -> bool {
        if self.checkpoint_every == 0 || outcomes.is_empty() || outcomes.len() % self.checkpoint_every != 0 {
            return false;
        }

        let document = self.merged(ResultsDocument::from_outcomes(None, root, outcomes, false));
        match self.save(&document) {
            Ok(()) => {
                tracing::info!(
                    path = %self.path.display(),
                    processed = outcomes.len(),
                    "Checkpoint saved"
                );
                true
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Checkpoint failed");
                false
            }
        }
    }

    fn merged(&self, document: ResultsDocument) -> ResultsDocument {
        match &self.previous {
            Some(previous) => {
                let mut merged = previous.clone();
                merged.merge(document);
                merged
            }
            None => document,
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "results.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Compare directories by canonical path when both resolve
fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

//! Per-image results and the batch report

use crate::error::{FailureRecord, PipelineFailure, Stage};
use crate::models::image::PhotoId;
use crate::models::taxon::{Hierarchy, Rank, TaxonCandidate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fully resolved classification of one image
///
/// Immutable once built: fields are read through accessors only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    image_path: PathBuf,
    /// `None` only when scoring raw image bytes without uploading
    photo_id: Option<PhotoId>,
    taxon_id: u64,
    taxon_name: String,
    common_name: Option<String>,
    score: f64,
    hierarchy: Hierarchy,
}

impl ClassificationResult {
    pub fn new(
        image_path: impl Into<PathBuf>,
        photo_id: Option<PhotoId>,
        candidate: TaxonCandidate,
        hierarchy: Hierarchy,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            photo_id,
            taxon_id: candidate.taxon_id,
            taxon_name: candidate.name,
            common_name: candidate.common_name,
            score: candidate.score,
            hierarchy,
        }
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn photo_id(&self) -> Option<PhotoId> {
        self.photo_id
    }

    pub fn taxon_id(&self) -> u64 {
        self.taxon_id
    }

    pub fn taxon_name(&self) -> &str {
        &self.taxon_name
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Copy of this result pointing at a relocated image
    pub fn relocated(&self, new_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: new_path.into(),
            ..self.clone()
        }
    }
}

/// Outcome for one input image
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Success(ClassificationResult),
    Failure(PipelineFailure),
}

impl ImageOutcome {
    pub fn image_path(&self) -> &Path {
        match self {
            ImageOutcome::Success(result) => result.image_path(),
            ImageOutcome::Failure(failure) => &failure.image_path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ImageOutcome::Success(_))
    }

    pub fn as_success(&self) -> Option<&ClassificationResult> {
        match self {
            ImageOutcome::Success(result) => Some(result),
            ImageOutcome::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&PipelineFailure> {
        match self {
            ImageOutcome::Success(_) => None,
            ImageOutcome::Failure(failure) => Some(failure),
        }
    }
}

impl From<Result<ClassificationResult, PipelineFailure>> for ImageOutcome {
    fn from(result: Result<ClassificationResult, PipelineFailure>) -> Self {
        match result {
            Ok(r) => ImageOutcome::Success(r),
            Err(f) => ImageOutcome::Failure(f),
        }
    }
}

/// Ordered outcomes of one batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per attempted image, in traversal order
    pub outcomes: Vec<ImageOutcome>,
    /// Images never attempted because the run was cancelled
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.outcomes.iter().filter_map(ImageOutcome::as_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PipelineFailure> {
        self.outcomes.iter().filter_map(ImageOutcome::as_failure)
    }

    pub fn was_cancelled(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut failures_by_stage = BTreeMap::new();
        for failure in self.failures() {
            *failures_by_stage.entry(failure.stage).or_insert(0) += 1;
        }

        let succeeded = self.successes().count();
        BatchSummary {
            total: self.outcomes.len() + self.skipped.len(),
            succeeded,
            failed: self.outcomes.len() - succeeded,
            skipped: self.skipped.len(),
            failures_by_stage,
        }
    }

    pub fn failure_records(&self) -> Vec<FailureRecord> {
        self.failures().map(FailureRecord::from).collect()
    }
}

/// Success/failure counts of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures_by_stage: BTreeMap<Stage, usize>,
}

/// Distinct hierarchy levels seen across successful results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyStats {
    pub processed: usize,
    pub subfamilies: BTreeSet<String>,
    pub tribes: BTreeSet<String>,
    pub genera: BTreeSet<String>,
}

impl HierarchyStats {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassificationResult>,
    {
        let mut stats = HierarchyStats::default();
        for result in results {
            stats.processed += 1;
            let hierarchy = result.hierarchy();
            for rank in Rank::ALL {
                if let Some(level) = hierarchy.get(rank) {
                    let set = match rank {
                        Rank::Subfamily => &mut stats.subfamilies,
                        Rank::Tribe => &mut stats.tribes,
                        Rank::Genus => &mut stats.genera,
                    };
                    set.insert(level.to_string());
                }
            }
        }
        stats
    }
}

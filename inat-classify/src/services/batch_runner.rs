//! Batch runner
//!
//! Classifies every image under a directory, one at a time and in sorted
//! path order. A failed image is recorded and the run moves on; only an
//! unusable root directory fails the run.

use crate::config::PipelineConfig;
use crate::models::{BatchReport, ImageOutcome};
use crate::services::file_scanner::{ImageScanner, ScanError};
use crate::services::pipeline::Pipeline;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct BatchRunner {
    pipeline: Pipeline,
    scanner: ImageScanner,
    pacing: Duration,
    cancel_token: CancellationToken,
    /// Images left out of the run, e.g. those a resumed run already has
    completed: HashSet<PathBuf>,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline, config: &PipelineConfig) -> Self {
        Self {
            pipeline,
            scanner: ImageScanner::new(config.recursive),
            pacing: config.pacing,
            cancel_token: CancellationToken::new(),
            completed: HashSet::new(),
        }
    }

    /// Leave these images out of the run
    pub fn with_completed(mut self, completed: HashSet<PathBuf>) -> Self {
        self.completed = completed;
        self
    }

    /// Stop between images once this token is cancelled
    pub fn with_cancellation(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub async fn run(&self, directory: &Path) -> Result<BatchReport, ScanError> {
        self.run_with_observer(directory, |_| {}).await
    }

    /// Run, calling `on_outcome` with all outcomes so far after each image
    pub async fn run_with_observer<F>(&self, directory: &Path, mut on_outcome: F) -> Result<BatchReport, ScanError>
    where
        F: FnMut(&[ImageOutcome]),
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();

        let mut images = self.scanner.scan(directory)?;
        let found = images.len();
        images.retain(|path| !self.completed.contains(path));
        let total = images.len();

        tracing::info!(
            %run_id,
            root = %directory.display(),
            images = total,
            already_processed = found - total,
            "Batch started"
        );

        let mut outcomes: Vec<ImageOutcome> = Vec::with_capacity(total);
        let mut skipped = Vec::new();

        for (index, image_path) in images.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                tracing::info!(
                    %run_id,
                    processed = index,
                    remaining = total - index,
                    "Batch cancelled"
                );
                skipped.extend(images[index..].iter().cloned());
                break;
            }

            tracing::info!(
                %run_id,
                image = %image_path.display(),
                "Processing image {} of {}",
                index + 1,
                total
            );

            let outcome = ImageOutcome::from(self.pipeline.process(image_path).await);
            outcomes.push(outcome);
            on_outcome(&outcomes);

            // Pace requests between images, never after the last one
            if index + 1 < total && !self.pacing.is_zero() {
                tokio::select! {
                    _ = self.cancel_token.cancelled() => {}
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }
        }

        let report = BatchReport {
            run_id,
            root: directory.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
            skipped,
        };

        let summary = report.summary();
        tracing::info!(
            %run_id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Batch finished"
        );
        for (stage, count) in &summary.failures_by_stage {
            tracing::info!(%run_id, %stage, count, "Failures by stage");
        }

        Ok(report)
    }
}

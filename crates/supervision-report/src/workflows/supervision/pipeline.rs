use chrono::{Local, NaiveDate, SecondsFormat};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use super::archive::ArchiveStore;
use super::artifacts::{StorageLayout, REPORT};
use super::domain::DateRange;
use super::extract::{ExtractError, Extractor, RawArtifacts};
use super::merge::{MergeArtifact, MergeError, Merger};
use super::transform::{TransformArtifact, TransformError, Transformer};
use crate::workflows::publishing::{
    notify_quietly, ArtifactPublisher, Notifier, ReportStatus, SyncReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Pull,
    Transform,
    Merge,
}

impl PipelinePhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Transform => "transform",
            Self::Merge => "merge",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub range: DateRange,
    pub run_date: NaiveDate,
    pub raw: RawArtifacts,
    pub transformed: TransformArtifact,
    pub report: MergeArtifact,
    pub raw_sync: SyncReport,
    pub report_sync: SyncReport,
}

#[derive(Debug)]
pub enum RunStatus {
    Success(Box<PipelineSummary>),
    Failed {
        phase: PipelinePhase,
        error: PhaseError,
    },
}

impl RunStatus {
    pub fn report_status(&self) -> ReportStatus {
        if self.is_success() {
            ReportStatus::Success
        } else {
            ReportStatus::Failure
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.report_status().exit_code()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

enum Stage {
    Pull,
    Transform(RawArtifacts),
    Merge(RawArtifacts, TransformArtifact),
}

/// Runs pull, transform and merge in order, each phase starting only from the
/// fully written artifacts of the previous one.
#[derive(Debug)]
pub struct SupervisionPipeline {
    extractor: Extractor,
    transformer: Transformer,
    merger: Merger,
    layout: StorageLayout,
    publisher: ArtifactPublisher,
    notifier: Box<dyn Notifier>,
}

impl SupervisionPipeline {
    pub fn new(
        extractor: Extractor,
        transformer: Transformer,
        merger: Merger,
        layout: StorageLayout,
        publisher: ArtifactPublisher,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            extractor,
            transformer,
            merger,
            layout,
            publisher,
            notifier,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn report_store(&self) -> ArchiveStore {
        report_store(&self.layout)
    }

    pub fn pull(&self, range: &DateRange, run_date: NaiveDate) -> Result<RawArtifacts, ExtractError> {
        self.extractor.pull(range, &self.layout.raw_dir(), run_date)
    }

    pub fn transform(
        &self,
        raw_billing: &Path,
        run_date: NaiveDate,
    ) -> Result<TransformArtifact, TransformError> {
        self.transformer
            .run(raw_billing, &self.layout.transformed_dir(), run_date)
    }

    pub fn merge(
        &self,
        transformed: &Path,
        certification: &Path,
        run_date: NaiveDate,
    ) -> Result<MergeArtifact, MergeError> {
        self.merger
            .run(transformed, certification, &self.report_store(), run_date)
    }

    /// Full run followed by notification. Never panics on phase failure; the
    /// returned status carries the failing phase and its error.
    pub fn run(&self, range: &DateRange, run_date: NaiveDate) -> RunStatus {
        info!(%range, %run_date, "supervision pipeline starting");
        let status = self.execute(range, run_date);

        match &status {
            RunStatus::Success(summary) => info!(
                rows = summary.report.outcome.rows.len(),
                report = %summary.report.path.display(),
                sync_failures = summary.report_sync.failures.len() + summary.raw_sync.failures.len(),
                "supervision pipeline completed"
            ),
            RunStatus::Failed { phase, error } => error!(
                phase = phase.label(),
                error = %error,
                "supervision pipeline failed"
            ),
        }

        self.notify(status.report_status());
        status
    }

    /// Notifier errors are logged and swallowed.
    pub fn notify(&self, status: ReportStatus) {
        notify_quietly(self.notifier.as_ref(), status);
    }

    fn execute(&self, range: &DateRange, run_date: NaiveDate) -> RunStatus {
        let mut stage = Stage::Pull;
        loop {
            stage = match stage {
                Stage::Pull => {
                    match timed(PipelinePhase::Pull, || self.pull(range, run_date)) {
                        Ok(raw) => Stage::Transform(raw),
                        Err(error) => return failed(PipelinePhase::Pull, error),
                    }
                }
                Stage::Transform(raw) => {
                    match timed(PipelinePhase::Transform, || self.transform(&raw.billing, run_date)) {
                        Ok(transformed) => Stage::Merge(raw, transformed),
                        Err(error) => return failed(PipelinePhase::Transform, error),
                    }
                }
                Stage::Merge(raw, transformed) => {
                    let merged = timed(PipelinePhase::Merge, || {
                        self.merge(&transformed.path, &raw.certification, run_date)
                    });
                    let report = match merged {
                        Ok(report) => report,
                        Err(error) => return failed(PipelinePhase::Merge, error),
                    };

                    let report_sync = self.publisher.publish_report(&report.path);
                    let raw_sync = self.publisher.publish_raw(&raw.paths());
                    return RunStatus::Success(Box::new(PipelineSummary {
                        range: *range,
                        run_date,
                        raw,
                        transformed,
                        report,
                        raw_sync,
                        report_sync,
                    }));
                }
            };
        }
    }
}

pub fn report_store(layout: &StorageLayout) -> ArchiveStore {
    ArchiveStore::new(layout.reports_dir(), layout.report_archive_dir(), REPORT)
}

fn failed(phase: PipelinePhase, error: impl Into<PhaseError>) -> RunStatus {
    RunStatus::Failed {
        phase,
        error: error.into(),
    }
}

fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn timed<T, E: std::fmt::Display>(
    phase: PipelinePhase,
    work: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    info!(phase = phase.label(), started_at = %timestamp(), "phase started");
    let started = Instant::now();
    let result = work();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => info!(
            phase = phase.label(),
            finished_at = %timestamp(),
            elapsed_ms,
            "phase finished"
        ),
        Err(err) => error!(
            phase = phase.label(),
            finished_at = %timestamp(),
            elapsed_ms,
            error = %err,
            "phase failed"
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_have_stable_labels() {
        let labels: Vec<_> = [
            PipelinePhase::Pull,
            PipelinePhase::Transform,
            PipelinePhase::Merge,
        ]
        .into_iter()
        .map(PipelinePhase::label)
        .collect();
        assert_eq!(labels, vec!["pull", "transform", "merge"]);
    }

    #[test]
    fn failed_status_maps_to_exit_code_one() {
        let status = failed(
            PipelinePhase::Transform,
            TransformError::MissingInput("raw.csv".into()),
        );
        assert_eq!(status.exit_code(), 1);
        assert_eq!(status.report_status(), ReportStatus::Failure);
        assert!(!status.is_success());
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let stamp = timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}

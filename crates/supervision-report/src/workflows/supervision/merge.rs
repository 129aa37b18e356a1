use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::archive::{ArchiveEntry, ArchiveError, ArchiveStore};
use super::artifacts;
use super::domain::{
    round_to, supervision_ratio, CertificationRecord, ComplianceRange, ComplianceStatus,
    MergedRow, ProviderLocationGroup,
};
use super::workbook::{self, WorkbookError};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("merge input not found: {0}")]
    MissingInput(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: csv::Error },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error("failed to publish report: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub certification_rows: usize,
    /// Certification rows without a provider id or usable hours.
    pub dropped_certification_rows: usize,
    pub matched_providers: usize,
    /// Certification providers with no transformed row; excluded from output.
    pub unmatched_certification_providers: Vec<String>,
    pub below_minimum: usize,
    pub above_maximum: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub rows: Vec<MergedRow>,
    pub stats: MergeStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeArtifact {
    pub path: PathBuf,
    pub sheets: Vec<String>,
    pub archived: Vec<ArchiveEntry>,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone)]
pub struct Merger {
    compliance: ComplianceRange,
}

impl Merger {
    pub fn new(compliance: ComplianceRange) -> Self {
        Self { compliance }
    }

    /// Joins the transformed artifact with certification hours, archives the
    /// current report and writes the new one at the canonical path.
    pub fn run(
        &self,
        transformed_path: &Path,
        certification_path: &Path,
        store: &ArchiveStore,
        run_date: NaiveDate,
    ) -> Result<MergeArtifact, MergeError> {
        let groups: Vec<ProviderLocationGroup> = read_strict(transformed_path)?;
        info!(rows = groups.len(), input = %transformed_path.display(), "loaded transformed data");

        let (certifications, undecodable) = read_lenient(certification_path)?;
        info!(
            rows = certifications.len(),
            input = %certification_path.display(),
            "loaded certification data"
        );

        let mut outcome = self.merge(groups, &certifications);
        outcome.stats.certification_rows += undecodable;
        outcome.stats.dropped_certification_rows += undecodable;
        log_stats(&outcome.stats);

        store.plan(run_date)?;
        let path = store.canonical_path(run_date);
        fs::create_dir_all(store.current_dir())?;
        let partial = artifacts::partial_path(&path);

        let sheets = match workbook::write_report(&outcome.rows, &self.compliance, &partial) {
            Ok(sheets) => sheets,
            Err(err) => {
                let _ = fs::remove_file(&partial);
                return Err(err.into());
            }
        };

        let archived = match store.rotate(run_date) {
            Ok(archived) => archived,
            Err(err) => {
                let _ = fs::remove_file(&partial);
                return Err(err.into());
            }
        };
        artifacts::promote(&partial, &path)?;

        info!(
            output = %path.display(),
            sheets = sheets.len(),
            archived = archived.len(),
            "supervision report written"
        );

        Ok(MergeArtifact {
            path,
            sheets,
            archived,
            outcome,
        })
    }

    /// Left join from the transformed side on provider id. Every row of a
    /// provider carries that provider's summed certification hours.
    pub fn merge(
        &self,
        groups: Vec<ProviderLocationGroup>,
        certifications: &[CertificationRecord],
    ) -> MergeOutcome {
        let mut stats = MergeStats {
            certification_rows: certifications.len(),
            ..MergeStats::default()
        };

        let mut hours_by_provider: BTreeMap<&str, f64> = BTreeMap::new();
        for record in certifications {
            let usable = record.provider_id.as_deref().zip(
                record
                    .certification_hours
                    .filter(|hours| hours.is_finite() && *hours >= 0.0),
            );
            match usable {
                Some((provider_id, hours)) => {
                    *hours_by_provider.entry(provider_id).or_default() += hours;
                }
                None => stats.dropped_certification_rows += 1,
            }
        }

        let transformed_providers: BTreeSet<&str> = groups
            .iter()
            .map(|group| group.provider_id.as_str())
            .collect();
        stats.unmatched_certification_providers = hours_by_provider
            .keys()
            .filter(|provider_id| !transformed_providers.contains(*provider_id))
            .map(|provider_id| provider_id.to_string())
            .collect();
        stats.matched_providers = hours_by_provider.len() - stats.unmatched_certification_providers.len();

        let rows: Vec<MergedRow> = groups
            .into_iter()
            .map(|group| {
                let certification = hours_by_provider.get(group.provider_id.as_str()).copied();
                self.merged_row(group, certification)
            })
            .collect();

        for row in &rows {
            match row.compliance {
                ComplianceStatus::BelowMinimum => stats.below_minimum += 1,
                ComplianceStatus::AboveMaximum => stats.above_maximum += 1,
                ComplianceStatus::WithinRange => {}
            }
        }

        MergeOutcome { rows, stats }
    }

    fn merged_row(&self, group: ProviderLocationGroup, certification: Option<f64>) -> MergedRow {
        let certification_hours = round_to(certification.unwrap_or(0.0), 2);
        let combined_supervised_hours = round_to(group.supervision_hours + certification_hours, 2);
        let combined_pct = round_to(
            supervision_ratio(
                combined_supervised_hours,
                group.direct_hours + combined_supervised_hours,
            ),
            4,
        );

        MergedRow {
            compliance: self.compliance.assess(combined_pct),
            group,
            certification_hours,
            certification_matched: certification.is_some(),
            combined_supervised_hours,
            combined_pct,
        }
    }
}

fn read_strict(path: &Path) -> Result<Vec<ProviderLocationGroup>, MergeError> {
    let read_error = |source: csv::Error| MergeError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = open(path)?;
    artifacts::read_csv(file).map_err(read_error)
}

fn read_lenient(path: &Path) -> Result<(Vec<CertificationRecord>, usize), MergeError> {
    let file = open(path)?;
    artifacts::read_csv_lenient(file).map_err(|source| MergeError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn open(path: &Path) -> Result<File, MergeError> {
    File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => MergeError::MissingInput(path.to_path_buf()),
        _ => MergeError::Io(err),
    })
}

fn log_stats(stats: &MergeStats) {
    info!(
        certification_rows = stats.certification_rows,
        matched_providers = stats.matched_providers,
        below_minimum = stats.below_minimum,
        above_maximum = stats.above_maximum,
        "certification hours merged"
    );
    if stats.dropped_certification_rows > 0 {
        warn!(
            rows = stats.dropped_certification_rows,
            "dropped certification rows with missing provider or hours"
        );
    }
    if !stats.unmatched_certification_providers.is_empty() {
        warn!(
            providers = stats.unmatched_certification_providers.len(),
            ids = ?stats.unmatched_certification_providers,
            "certification providers without supervision rows were excluded"
        );
    }
}

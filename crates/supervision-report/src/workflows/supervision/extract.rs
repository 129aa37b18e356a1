use chrono::{Duration, NaiveDate};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::info;

use super::artifacts::{self, RAW_BILLING, RAW_CERTIFICATION};
use super::domain::{BillingRecord, CertificationRecord, DateRange, DateRangeError};

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("warehouse connection failed: {0}")]
    Connection(String),
    #[error("warehouse query failed: {0}")]
    Query(String),
    #[error("warehouse runtime unavailable: {0}")]
    Runtime(String),
}

/// Read-only access to the billing warehouse.
pub trait Warehouse: Debug {
    fn fetch_billing(&self, range: &DateRange) -> Result<Vec<BillingRecord>, WarehouseError>;
    fn fetch_certification(
        &self,
        range: &DateRange,
    ) -> Result<Vec<CertificationRecord>, WarehouseError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("failed to write raw extract {path}: {source}")]
    Write { path: PathBuf, source: csv::Error },
    #[error("failed to inspect raw extracts: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Range(#[from] DateRangeError),
}

/// Paths of the two fully written raw extracts for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifacts {
    pub billing: PathBuf,
    pub certification: PathBuf,
    pub billing_rows: usize,
    pub certification_rows: usize,
}

impl RawArtifacts {
    pub fn locate(raw_dir: &Path, run_date: NaiveDate) -> Self {
        Self {
            billing: RAW_BILLING.path_in(raw_dir, run_date),
            certification: RAW_CERTIFICATION.path_in(raw_dir, run_date),
            billing_rows: 0,
            certification_rows: 0,
        }
    }

    pub fn paths(&self) -> [&Path; 2] {
        [self.billing.as_path(), self.certification.as_path()]
    }
}

#[derive(Debug)]
pub struct Extractor {
    warehouse: Box<dyn Warehouse>,
}

impl Extractor {
    pub fn new(warehouse: Box<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Pulls both datasets, then writes them. Nothing is written unless both
    /// queries succeed.
    pub fn pull(
        &self,
        range: &DateRange,
        raw_dir: &Path,
        run_date: NaiveDate,
    ) -> Result<RawArtifacts, ExtractError> {
        info!(%range, "pulling supervision billing entries");
        let billing = self.warehouse.fetch_billing(range)?;
        info!(rows = billing.len(), "billing query returned");

        info!(%range, "pulling certification supervision hours");
        let certification = self.warehouse.fetch_certification(range)?;
        info!(rows = certification.len(), "certification query returned");

        let mut artifacts = RawArtifacts::locate(raw_dir, run_date);
        write_extract(&artifacts.billing, &billing)?;
        write_extract(&artifacts.certification, &certification)?;
        artifacts.billing_rows = billing.len();
        artifacts.certification_rows = certification.len();

        info!(
            billing = %artifacts.billing.display(),
            certification = %artifacts.certification.display(),
            "raw extracts saved"
        );
        Ok(artifacts)
    }
}

fn write_extract<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<(), ExtractError> {
    artifacts::write_csv(path, rows).map_err(|source| ExtractError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Resumes from the newest raw billing extract through today:
/// `[latest pull date, today + 1)`. Without any previous extract this is the
/// month-to-date range.
pub fn since_latest_pull(raw_dir: &Path, today: NaiveDate) -> Result<DateRange, ExtractError> {
    match RAW_BILLING.latest_date(raw_dir)? {
        Some(latest) => {
            info!(%latest, "resuming from latest raw extract");
            Ok(DateRange::new(latest, today + Duration::days(1))?)
        }
        None => {
            info!("no raw extracts found, using month-to-date range");
            Ok(DateRange::month_to_date(today))
        }
    }
}

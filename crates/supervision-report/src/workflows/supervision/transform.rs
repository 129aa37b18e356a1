use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::artifacts::{self, TRANSFORMED};
use super::clinic::ClinicRules;
use super::domain::{
    round_to, supervision_ratio, BillingRecord, ProviderLocationGroup, ServiceCategory,
    ServiceCodes,
};

const UNKNOWN_LOCATION: &str = "(Unknown)";

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("raw extract not found: {0}")]
    MissingInput(PathBuf),
    #[error("failed to read raw extract {path}: {source}")]
    Read { path: PathBuf, source: csv::Error },
    #[error("failed to write transformed artifact {path}: {source}")]
    Write { path: PathBuf, source: csv::Error },
}

/// Row-level accounting for one transform. None of these are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub input_rows: usize,
    /// Rows missing a provider, service code or usable hours, including rows
    /// that could not be decoded at all.
    pub dropped_rows: usize,
    pub unclassified_rows: usize,
    /// Direct rows and attributed supervision rows belonging to providers who
    /// also supervise.
    pub excluded_self_supervision_rows: usize,
    pub unattributed_supervision_rows: usize,
    pub unknown_clinic_groups: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub groups: Vec<ProviderLocationGroup>,
    pub stats: TransformStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformArtifact {
    pub path: PathBuf,
    pub outcome: TransformOutcome,
}

#[derive(Debug, Clone)]
pub struct Transformer {
    codes: ServiceCodes,
    clinics: ClinicRules,
}

struct Entry<'a> {
    provider_id: &'a str,
    provider_name: Option<&'a str>,
    location: &'a str,
    category: ServiceCategory,
    hours: f64,
    supervised_provider_id: Option<&'a str>,
    supervised_location: Option<&'a str>,
}

#[derive(Default)]
struct Totals {
    direct: f64,
    supervision: f64,
}

impl Transformer {
    pub fn new(codes: ServiceCodes, clinics: ClinicRules) -> Self {
        Self { codes, clinics }
    }

    /// Reads the raw billing extract, reshapes it and writes the dated
    /// transformed artifact into `output_dir`.
    pub fn run(
        &self,
        raw_path: &Path,
        output_dir: &Path,
        run_date: NaiveDate,
    ) -> Result<TransformArtifact, TransformError> {
        if !raw_path.exists() {
            return Err(TransformError::MissingInput(raw_path.to_path_buf()));
        }

        info!(input = %raw_path.display(), "reading raw billing extract");
        let read_error = |source: csv::Error| TransformError::Read {
            path: raw_path.to_path_buf(),
            source,
        };
        let file = File::open(raw_path).map_err(|err| read_error(err.into()))?;
        let (records, undecodable) =
            artifacts::read_csv_lenient::<BillingRecord, _>(file).map_err(read_error)?;

        let mut outcome = self.transform(&records);
        outcome.stats.input_rows += undecodable;
        outcome.stats.dropped_rows += undecodable;
        log_stats(&outcome);

        let path = TRANSFORMED.path_in(output_dir, run_date);
        artifacts::write_csv(&path, &outcome.groups).map_err(|source| TransformError::Write {
            path: path.clone(),
            source,
        })?;
        info!(output = %path.display(), groups = outcome.groups.len(), "transformed artifact saved");

        Ok(TransformArtifact { path, outcome })
    }

    /// Groups direct work by provider and location, attributing supervision
    /// hours to the supervised provider at the location of the overlapped
    /// direct session. Anyone who supervises during the
    /// period is left out of the direct-provider output entirely.
    pub fn transform(&self, records: &[BillingRecord]) -> TransformOutcome {
        let mut stats = TransformStats {
            input_rows: records.len(),
            ..TransformStats::default()
        };

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            match self.validate(record) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => stats.unclassified_rows += 1,
                Err(()) => stats.dropped_rows += 1,
            }
        }

        let supervisors: HashSet<&str> = entries
            .iter()
            .filter(|entry| entry.category == ServiceCategory::Supervision)
            .map(|entry| entry.provider_id)
            .collect();

        let mut names: HashMap<&str, &str> = HashMap::new();
        let mut totals: BTreeMap<(&str, &str), Totals> = BTreeMap::new();

        for entry in &entries {
            match entry.category {
                ServiceCategory::Direct => {
                    if supervisors.contains(entry.provider_id) {
                        stats.excluded_self_supervision_rows += 1;
                        continue;
                    }
                    if let Some(name) = entry.provider_name {
                        names.entry(entry.provider_id).or_insert(name);
                    }
                    totals
                        .entry((entry.provider_id, entry.location))
                        .or_default()
                        .direct += entry.hours;
                }
                ServiceCategory::Supervision => match entry.supervised_provider_id {
                    None => stats.unattributed_supervision_rows += 1,
                    Some(supervised) if supervisors.contains(supervised) => {
                        stats.excluded_self_supervision_rows += 1;
                    }
                    Some(supervised) => {
                        let location = entry.supervised_location.unwrap_or(entry.location);
                        totals
                            .entry((supervised, location))
                            .or_default()
                            .supervision += entry.hours;
                    }
                },
            }
        }

        let mut groups: Vec<ProviderLocationGroup> = totals
            .into_iter()
            .map(|((provider_id, location), totals)| {
                let clinic = match self.clinics.resolve(location) {
                    Some(clinic) => clinic,
                    None => {
                        stats.unknown_clinic_groups += 1;
                        self.clinics.unknown_label.clone()
                    }
                };
                let direct_hours = round_to(totals.direct, 2);
                let supervision_hours = round_to(totals.supervision, 2);
                ProviderLocationGroup {
                    clinic,
                    provider_id: provider_id.to_string(),
                    provider_name: names
                        .get(provider_id)
                        .copied()
                        .unwrap_or(provider_id)
                        .to_string(),
                    service_location: location.to_string(),
                    direct_hours,
                    supervision_hours,
                    supervision_pct: round_to(
                        supervision_ratio(supervision_hours, direct_hours + supervision_hours),
                        4,
                    ),
                }
            })
            .collect();

        groups.sort_by(|a, b| {
            (&a.clinic, &a.provider_name, &a.provider_id, &a.service_location).cmp(&(
                &b.clinic,
                &b.provider_name,
                &b.provider_id,
                &b.service_location,
            ))
        });

        TransformOutcome { groups, stats }
    }

    /// `Err` for rows missing required fields, `Ok(None)` for service codes
    /// outside both categories.
    fn validate<'a>(&self, record: &'a BillingRecord) -> Result<Option<Entry<'a>>, ()> {
        let provider_id = record.provider_id.as_deref().ok_or(())?;
        let code = record.service_code.as_deref().ok_or(())?;
        let hours = record
            .billed_hours
            .filter(|hours| hours.is_finite() && *hours >= 0.0)
            .ok_or(())?;

        let Some(category) = self.codes.classify(code) else {
            return Ok(None);
        };

        Ok(Some(Entry {
            provider_id,
            provider_name: record.provider_name.as_deref(),
            location: record
                .service_location
                .as_deref()
                .unwrap_or(UNKNOWN_LOCATION),
            category,
            hours,
            supervised_provider_id: record.supervised_provider_id.as_deref(),
            supervised_location: record.supervised_service_location.as_deref(),
        }))
    }
}

fn log_stats(outcome: &TransformOutcome) {
    let stats = &outcome.stats;
    info!(
        input_rows = stats.input_rows,
        groups = outcome.groups.len(),
        excluded_self_supervision = stats.excluded_self_supervision_rows,
        "supervision hours transformed"
    );
    if stats.dropped_rows > 0 {
        warn!(rows = stats.dropped_rows, "dropped rows with missing required fields");
    }
    if stats.unclassified_rows > 0 {
        warn!(rows = stats.unclassified_rows, "dropped rows with unrecognized service codes");
    }
    if stats.unattributed_supervision_rows > 0 {
        info!(
            rows = stats.unattributed_supervision_rows,
            "supervision rows without an overlapping direct session"
        );
    }
    if stats.unknown_clinic_groups > 0 {
        warn!(
            groups = stats.unknown_clinic_groups,
            "locations did not match any clinic rule"
        );
    }
}

use std::path::Path;
use tracing::warn;

use super::drive::{CloudSync, SyncedFile};

/// Cloud folders each artifact kind is mirrored into. Unset folders are
/// skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTargets {
    pub raw_folder_id: Option<String>,
    pub report_folder_id: Option<String>,
    pub report_archive_folder_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: Vec<SyncedFile>,
    pub archived: Vec<String>,
    pub failures: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Best-effort mirroring: failures are logged and collected, never raised.
#[derive(Debug, Default)]
pub struct ArtifactPublisher {
    sync: Option<Box<dyn CloudSync>>,
    targets: SyncTargets,
}

impl ArtifactPublisher {
    pub fn new(sync: Box<dyn CloudSync>, targets: SyncTargets) -> Self {
        Self {
            sync: Some(sync),
            targets,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sync.is_some()
    }

    /// Moves previously mirrored reports to the archive folder when one is
    /// configured, then uploads the new report.
    pub fn publish_report(&self, report: &Path) -> SyncReport {
        let mut outcome = SyncReport::default();
        let (Some(sync), Some(folder)) = (&self.sync, &self.targets.report_folder_id) else {
            return outcome;
        };

        if let Some(archive) = &self.targets.report_archive_folder_id {
            let keep = report.file_name().and_then(|name| name.to_str());
            match sync.archive_folder(folder, archive, keep) {
                Ok(moved) => outcome.archived = moved,
                Err(err) => {
                    warn!(error = %err, folder = %folder, "failed to archive synced reports");
                    outcome.failures.push(err.to_string());
                }
            }
        }

        Self::mirror_into(sync.as_ref(), report, folder, &mut outcome);
        outcome
    }

    pub fn publish_raw(&self, paths: &[&Path]) -> SyncReport {
        let mut outcome = SyncReport::default();
        let (Some(sync), Some(folder)) = (&self.sync, &self.targets.raw_folder_id) else {
            return outcome;
        };

        for path in paths {
            Self::mirror_into(sync.as_ref(), path, folder, &mut outcome);
        }
        outcome
    }

    fn mirror_into(sync: &dyn CloudSync, path: &Path, folder: &str, outcome: &mut SyncReport) {
        match sync.mirror(path, folder) {
            Ok(file) => outcome.synced.push(file),
            Err(err) => {
                warn!(error = %err, path = %path.display(), folder, "artifact sync failed");
                outcome.failures.push(format!("{}: {err}", path.display()));
            }
        }
    }
}

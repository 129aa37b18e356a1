use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::artifacts::ArtifactClass;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Another artifact already claims this run date, i.e. the same day was
    /// processed twice.
    #[error("archive collision at {path}: an artifact for {date} already exists")]
    Collision { path: PathBuf, date: NaiveDate },
    #[error("artifact {path} is dated {found}, after run date {run_date}")]
    OutOfOrder {
        path: PathBuf,
        found: NaiveDate,
        run_date: NaiveDate,
    },
    #[error("archive i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A previously current artifact and where it now lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub date: NaiveDate,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Current/archive convention for one artifact class: the current directory
/// holds the latest artifact, the archive directory every predecessor under
/// its original run-dated name. Single writer; callers guarantee exclusivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStore {
    current_dir: PathBuf,
    archive_dir: PathBuf,
    class: ArtifactClass,
}

impl ArchiveStore {
    pub fn new(
        current_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        class: ArtifactClass,
    ) -> Self {
        Self {
            current_dir: current_dir.into(),
            archive_dir: archive_dir.into(),
            class,
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn canonical_path(&self, run_date: NaiveDate) -> PathBuf {
        self.class.path_in(&self.current_dir, run_date)
    }

    pub fn current(&self) -> Result<Vec<(NaiveDate, PathBuf)>, ArchiveError> {
        Ok(self.class.dated_files(&self.current_dir)?)
    }

    pub fn archived(&self) -> Result<Vec<(NaiveDate, PathBuf)>, ArchiveError> {
        Ok(self.class.dated_files(&self.archive_dir)?)
    }

    /// Verifies a new artifact for `run_date` can be published without
    /// overwriting anything or breaking date order. Returns the planned moves.
    pub fn plan(&self, run_date: NaiveDate) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        for (date, path) in self.archived()? {
            if date == run_date {
                return Err(ArchiveError::Collision { path, date });
            }
            if date > run_date {
                return Err(ArchiveError::OutOfOrder {
                    path,
                    found: date,
                    run_date,
                });
            }
        }

        let mut moves = Vec::new();
        for (date, from) in self.current()? {
            if date == run_date {
                return Err(ArchiveError::Collision { path: from, date });
            }
            if date > run_date {
                return Err(ArchiveError::OutOfOrder {
                    path: from,
                    found: date,
                    run_date,
                });
            }

            let to = self.class.path_in(&self.archive_dir, date);
            if to.exists() {
                return Err(ArchiveError::Collision { path: to, date });
            }
            moves.push(ArchiveEntry { date, from, to });
        }

        Ok(moves)
    }

    /// Moves every current artifact into the archive. All checks run before
    /// the first move.
    pub fn rotate(&self, run_date: NaiveDate) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let moves = self.plan(run_date)?;
        if !moves.is_empty() {
            fs::create_dir_all(&self.archive_dir)?;
        }

        for entry in &moves {
            fs::rename(&entry.from, &entry.to)?;
            info!(
                from = %entry.from.display(),
                to = %entry.to.display(),
                "archived previous artifact"
            );
        }

        Ok(moves)
    }
}

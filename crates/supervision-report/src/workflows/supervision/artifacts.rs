use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const RAW_BILLING: ArtifactClass = ArtifactClass::new("daily_supervision_hours", "csv");
pub const RAW_CERTIFICATION: ArtifactClass = ArtifactClass::new("bacb_supervision_hours", "csv");
pub const TRANSFORMED: ArtifactClass =
    ArtifactClass::new("supervision_hours_transformed", "csv");
pub const REPORT: ArtifactClass = ArtifactClass::new("supervision_report", "xlsx");

const PARTIAL_SUFFIX: &str = "partial";

/// A family of files sharing a prefix and extension, each named
/// `<prefix>_<YYYY-MM-DD>.<extension>` after the run that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactClass {
    prefix: &'static str,
    extension: &'static str,
}

impl ArtifactClass {
    pub const fn new(prefix: &'static str, extension: &'static str) -> Self {
        Self { prefix, extension }
    }

    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("{}_{}.{}", self.prefix, date.format("%Y-%m-%d"), self.extension)
    }

    pub fn path_in(&self, dir: &Path, date: NaiveDate) -> PathBuf {
        dir.join(self.file_name(date))
    }

    /// Embedded date of a file belonging to this class, if it is one.
    pub fn parse_date(&self, file_name: &str) -> Option<NaiveDate> {
        let stem = file_name
            .strip_prefix(self.prefix)?
            .strip_prefix('_')?
            .strip_suffix(self.extension)?
            .strip_suffix('.')?;
        NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
    }

    /// Files of this class directly inside `dir`, oldest first. A missing
    /// directory has no files.
    pub fn dated_files(&self, dir: &Path) -> io::Result<Vec<(NaiveDate, PathBuf)>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(date) = name.to_str().and_then(|name| self.parse_date(name)) {
                files.push((date, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn latest_date(&self, dir: &Path) -> io::Result<Option<NaiveDate>> {
        Ok(self.dated_files(dir)?.last().map(|(date, _)| *date))
    }
}

/// On-disk layout rooted at the configured data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw_pulls")
    }

    pub fn transformed_dir(&self) -> PathBuf {
        self.root.join("transformed")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn report_archive_dir(&self) -> PathBuf {
        self.reports_dir().join("archived")
    }
}

/// Sibling path an artifact is written to before being renamed into place.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

pub fn promote(partial: &Path, path: &Path) -> io::Result<()> {
    fs::rename(partial, path)
}

/// Writes `rows` as CSV through a partial file so `path` only ever holds a
/// complete artifact.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    let result = write_rows(&partial, rows)
        .and_then(|()| promote(&partial, path).map_err(csv::Error::from));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Strict read: any malformed record fails the whole load.
pub fn read_csv<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader.deserialize().collect()
}

/// Lenient read for warehouse extracts: records that fail to deserialize are
/// skipped and counted, while I/O failures still abort.
pub fn read_csv_lenient<T: DeserializeOwned, R: Read>(
    reader: R,
) -> Result<(Vec<T>, usize), csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0;

    for record in csv_reader.deserialize::<T>() {
        match record {
            Ok(row) => rows.push(row),
            Err(err) if err.is_io_error() => return Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "skipping malformed extract row");
                skipped += 1;
            }
        }
    }

    Ok((rows, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn file_names_embed_iso_dates() {
        assert_eq!(
            REPORT.file_name(date(2025, 10, 7)),
            "supervision_report_2025-10-07.xlsx"
        );
        assert_eq!(
            REPORT.parse_date("supervision_report_2025-10-07.xlsx"),
            Some(date(2025, 10, 7))
        );
    }

    #[test]
    fn parse_date_rejects_other_classes_and_partials() {
        assert_eq!(REPORT.parse_date("supervision_report_2025-10-07.xlsx.partial"), None);
        assert_eq!(REPORT.parse_date("supervision_report_latest.xlsx"), None);
        assert_eq!(RAW_BILLING.parse_date("bacb_supervision_hours_2025-10-07.csv"), None);
        assert_eq!(
            RAW_CERTIFICATION.parse_date("bacb_supervision_hours_2025-10-07.csv"),
            Some(date(2025, 10, 7))
        );
    }

    #[test]
    fn dated_files_are_sorted_and_missing_dirs_are_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        for day in [9, 3, 5] {
            fs::write(RAW_BILLING.path_in(dir.path(), date(2025, 10, day)), "x").expect("write");
        }
        fs::write(dir.path().join("notes.txt"), "x").expect("write");

        let dates: Vec<_> = RAW_BILLING
            .dated_files(dir.path())
            .expect("list")
            .into_iter()
            .map(|(date, _)| date)
            .collect();
        assert_eq!(dates, vec![date(2025, 10, 3), date(2025, 10, 5), date(2025, 10, 9)]);

        let missing = dir.path().join("nope");
        assert!(RAW_BILLING.dated_files(&missing).expect("list").is_empty());
    }

    #[test]
    fn write_csv_leaves_no_partial_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        #[derive(serde::Serialize)]
        struct Row {
            name: &'static str,
            count: u32,
        }

        let path = TRANSFORMED.path_in(&dir.path().join("nested"), date(2025, 10, 7));
        let rows = [
            Row { name: "a", count: 1 },
            Row { name: "b", count: 2 },
        ];
        write_csv(&path, &rows).expect("write csv");

        assert!(path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn lenient_read_counts_broken_records() {
        #[derive(Debug, serde::Deserialize)]
        struct Row {
            #[allow(dead_code)]
            id: u32,
        }

        let data = "id\n1\nnot-a-number\n3\n";
        let (rows, skipped) = read_csv_lenient::<Row, _>(data.as_bytes()).expect("read");
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 1);
    }
}

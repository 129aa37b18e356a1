use chrono::NaiveDate;
use std::fs::File;
use std::sync::{Arc, Mutex};
use supervision_report::workflows::publishing::{
    ArtifactPublisher, LocalFolderSync, Notifier, NotifyError, ReportStatus, SyncTargets,
};
use supervision_report::workflows::supervision::artifacts::{self, REPORT, TRANSFORMED};
use supervision_report::workflows::supervision::{
    ArchiveError, BillingRecord, CertificationRecord, ClinicRules, ComplianceRange, DateRange,
    Extractor, MergeError, Merger, PhaseError, PipelinePhase, ProviderLocationGroup, RunStatus,
    ServiceCodes, StorageLayout, SupervisionPipeline, Transformer, Warehouse, WarehouseError,
};

const AUSTIN: &str = "ORGANIZATION: Austin Clinic";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[derive(Debug, Default)]
struct FakeWarehouse {
    billing: Vec<BillingRecord>,
    certification: Vec<CertificationRecord>,
    offline: bool,
}

impl Warehouse for FakeWarehouse {
    fn fetch_billing(&self, _range: &DateRange) -> Result<Vec<BillingRecord>, WarehouseError> {
        if self.offline {
            return Err(WarehouseError::Connection("connection refused".to_string()));
        }
        Ok(self.billing.clone())
    }

    fn fetch_certification(
        &self,
        _range: &DateRange,
    ) -> Result<Vec<CertificationRecord>, WarehouseError> {
        if self.offline {
            return Err(WarehouseError::Connection("connection refused".to_string()));
        }
        Ok(self.certification.clone())
    }
}

#[derive(Debug, Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<ReportStatus>>>,
    broken: bool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<ReportStatus> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, status: ReportStatus) -> Result<(), NotifyError> {
        self.sent.lock().expect("notifier mutex poisoned").push(status);
        if self.broken {
            return Err(NotifyError::NoRecipients);
        }
        Ok(())
    }
}

fn billing(
    provider: &str,
    code: &str,
    hours: f64,
    supervised: Option<&str>,
) -> BillingRecord {
    BillingRecord {
        client_id: Some("client-1".to_string()),
        client_name: Some("Client One".to_string()),
        provider_id: Some(provider.to_string()),
        provider_name: Some(format!("Provider {provider}")),
        service_location: Some(AUSTIN.to_string()),
        service_code: Some(code.to_string()),
        service_date: Some(date(2025, 10, 6)),
        billed_hours: Some(hours),
        supervised_provider_id: supervised.map(str::to_string),
        supervised_service_location: supervised.map(|_| AUSTIN.to_string()),
    }
}

/// P only delivers direct work; Q delivers direct work and supervises P.
fn two_provider_warehouse() -> FakeWarehouse {
    FakeWarehouse {
        billing: vec![
            billing("P", "97153", 6.0, None),
            billing("P", "97153", 4.0, None),
            billing("Q", "97153", 5.0, None),
            billing("Q", "97155", 2.0, Some("P")),
        ],
        certification: vec![CertificationRecord {
            provider_id: Some("P".to_string()),
            provider_name: Some("Provider P".to_string()),
            certification_hours: Some(3.0),
            period_start: Some(date(2025, 10, 1)),
            period_end: Some(date(2025, 10, 31)),
        }],
        offline: false,
    }
}

fn pipeline(
    root: &std::path::Path,
    warehouse: FakeWarehouse,
    notifier: RecordingNotifier,
) -> SupervisionPipeline {
    let publisher = ArtifactPublisher::new(
        Box::new(LocalFolderSync::new(root.join("synced"))),
        SyncTargets {
            raw_folder_id: Some("raw".to_string()),
            report_folder_id: Some("reports".to_string()),
            report_archive_folder_id: Some("reports-archive".to_string()),
        },
    );
    SupervisionPipeline::new(
        Extractor::new(Box::new(warehouse)),
        Transformer::new(ServiceCodes::standard(), ClinicRules::standard()),
        Merger::new(ComplianceRange::default()),
        StorageLayout::new(root.join("data")),
        publisher,
        Box::new(notifier),
    )
}

#[test]
fn full_run_reports_only_pure_direct_providers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let notifier = RecordingNotifier::default();
    let pipeline = pipeline(dir.path(), two_provider_warehouse(), notifier.clone());
    let run_date = date(2025, 10, 18);

    let status = pipeline.run(&DateRange::month_to_date(run_date), run_date);
    let summary = match status {
        RunStatus::Success(summary) => summary,
        other => panic!("pipeline should succeed: {other:?}"),
    };

    let rows = &summary.report.outcome.rows;
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.group.provider_id, "P");
    assert_eq!(row.group.clinic, "Austin");
    assert_eq!(row.group.direct_hours, 10.0);
    assert_eq!(row.group.supervision_hours, 2.0);
    assert_eq!(row.combined_supervised_hours, 5.0);
    assert!((row.combined_pct - 1.0 / 3.0).abs() < 1e-3);
    assert_eq!(summary.report.sheets, vec!["Austin".to_string()]);

    let report_path = REPORT.path_in(&pipeline.layout().reports_dir(), run_date);
    assert_eq!(summary.report.path, report_path);
    assert!(report_path.exists());

    let transformed_path = TRANSFORMED.path_in(&pipeline.layout().transformed_dir(), run_date);
    let transformed: Vec<ProviderLocationGroup> =
        artifacts::read_csv(File::open(&transformed_path).expect("transformed written"))
            .expect("transformed decodes");
    assert!(transformed.iter().all(|group| group.provider_id != "Q"));

    assert!(summary.report_sync.is_clean());
    assert_eq!(summary.raw_sync.synced.len(), 2);
    assert!(dir
        .path()
        .join("synced/reports/supervision_report_2025-10-18.xlsx")
        .exists());
    assert_eq!(notifier.sent(), vec![ReportStatus::Success]);
}

#[test]
fn second_merge_for_the_same_day_is_a_collision() {
    let dir = tempfile::tempdir().expect("tempdir");
    let notifier = RecordingNotifier::default();
    let pipeline = pipeline(dir.path(), two_provider_warehouse(), notifier.clone());
    let run_date = date(2025, 10, 18);
    let range = DateRange::month_to_date(run_date);

    assert!(pipeline.run(&range, run_date).is_success());
    let status = pipeline.run(&range, run_date);

    match &status {
        RunStatus::Failed {
            phase: PipelinePhase::Merge,
            error: PhaseError::Merge(MergeError::Archive(ArchiveError::Collision { .. })),
        } => {}
        other => panic!("expected merge collision, got {other:?}"),
    }
    assert_eq!(status.exit_code(), 1);
    assert_eq!(pipeline.report_store().current().expect("current").len(), 1);
    assert!(pipeline.report_store().archived().expect("archived").is_empty());
    assert_eq!(
        notifier.sent(),
        vec![ReportStatus::Success, ReportStatus::Failure]
    );
}

#[test]
fn consecutive_days_archive_the_previous_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = pipeline(
        dir.path(),
        two_provider_warehouse(),
        RecordingNotifier::default(),
    );

    for day in [16, 17, 18] {
        let run_date = date(2025, 10, day);
        let status = pipeline.run(&DateRange::month_to_date(run_date), run_date);
        assert!(status.is_success(), "run for day {day} failed: {status:?}");
    }

    let store = pipeline.report_store();
    let archived: Vec<_> = store
        .archived()
        .expect("archived")
        .into_iter()
        .map(|(date, _)| date)
        .collect();
    assert_eq!(archived, vec![date(2025, 10, 16), date(2025, 10, 17)]);
    let current = store.current().expect("current");
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].0, date(2025, 10, 18));

    let synced_archive = dir.path().join("synced/reports-archive");
    assert!(synced_archive
        .join("supervision_report_2025-10-17.xlsx")
        .exists());
}

#[test]
fn warehouse_failure_stops_before_anything_is_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let notifier = RecordingNotifier::default();
    let warehouse = FakeWarehouse {
        offline: true,
        ..two_provider_warehouse()
    };
    let pipeline = pipeline(dir.path(), warehouse, notifier.clone());
    let run_date = date(2025, 10, 18);

    let status = pipeline.run(&DateRange::month_to_date(run_date), run_date);
    assert!(matches!(
        status,
        RunStatus::Failed {
            phase: PipelinePhase::Pull,
            ..
        }
    ));
    assert!(!pipeline.layout().raw_dir().exists());
    assert!(!pipeline.layout().reports_dir().exists());
    assert_eq!(notifier.sent(), vec![ReportStatus::Failure]);
}

#[test]
fn notifier_errors_do_not_change_the_outcome() {
    let dir = tempfile::tempdir().expect("tempdir");
    let notifier = RecordingNotifier {
        broken: true,
        ..RecordingNotifier::default()
    };
    let pipeline = pipeline(dir.path(), two_provider_warehouse(), notifier.clone());
    let run_date = date(2025, 10, 18);

    let status = pipeline.run(&DateRange::month_to_date(run_date), run_date);
    assert!(status.is_success());
    assert_eq!(status.exit_code(), 0);
    assert_eq!(notifier.sent(), vec![ReportStatus::Success]);
}

#[test]
fn empty_month_still_produces_a_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = pipeline(
        dir.path(),
        FakeWarehouse::default(),
        RecordingNotifier::default(),
    );
    let run_date = date(2025, 11, 1);

    let status = pipeline.run(&DateRange::month_to_date(run_date), run_date);
    let summary = match status {
        RunStatus::Success(summary) => summary,
        other => panic!("empty run should succeed: {other:?}"),
    };
    assert!(summary.report.outcome.rows.is_empty());
    assert_eq!(summary.report.sheets, vec!["No Data".to_string()]);
    assert_eq!(summary.range.start(), date(2025, 10, 1));
}

use crate::cli::{RangeArgs, RunDateArgs};
use crate::infra;
use supervision_report::config::AppConfig;
use supervision_report::error::AppError;
use supervision_report::telemetry;
use supervision_report::workflows::publishing::{notify_quietly, ReportStatus, SyncReport};
use supervision_report::workflows::supervision::artifacts::TRANSFORMED;
use supervision_report::workflows::supervision::pipeline::report_store;
use supervision_report::workflows::supervision::{
    DateRange, MergeArtifact, PhaseError, RawArtifacts, RunStatus, SupervisionPipeline,
    TransformArtifact,
};
use tracing::{error, info};

fn bootstrap() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    info!(environment = ?config.environment, "configuration loaded");
    Ok(config)
}

/// Full run. Setup failures after the notifier exists are reported as a
/// failed run before the error is returned.
pub(crate) fn run_pipeline(args: RangeArgs) -> Result<i32, AppError> {
    let config = bootstrap()?;
    let notifier = infra::notifier(&config)?;
    let layout = infra::layout(&config);
    let run_date = args.run_date();

    let setup = args
        .resolve(&layout.raw_dir(), run_date)
        .and_then(|range| Ok((range, infra::extractor(&config)?, infra::transformer(&config)?)));
    let (range, extractor, transformer) = match setup {
        Ok(parts) => parts,
        Err(err) => {
            error!(error = %err, "pipeline setup failed");
            notify_quietly(notifier.as_ref(), ReportStatus::Failure);
            return Err(err);
        }
    };

    let pipeline = SupervisionPipeline::new(
        extractor,
        transformer,
        infra::merger(&config),
        layout,
        infra::publisher(&config),
        notifier,
    );
    let status = pipeline.run(&range, run_date);
    render_status(&status);
    Ok(status.exit_code())
}

pub(crate) fn run_pull(args: RangeArgs) -> Result<i32, AppError> {
    let config = bootstrap()?;
    let layout = infra::layout(&config);
    let run_date = args.run_date();
    let range = args.resolve(&layout.raw_dir(), run_date)?;

    let raw = infra::extractor(&config)?.pull(&range, &layout.raw_dir(), run_date)?;
    render_range(&range);
    render_raw(&raw);
    Ok(0)
}

pub(crate) fn run_transform(args: RunDateArgs) -> Result<i32, AppError> {
    let config = bootstrap()?;
    let layout = infra::layout(&config);
    let run_date = args.run_date();
    let raw = RawArtifacts::locate(&layout.raw_dir(), run_date);

    let transformed = infra::transformer(&config)?
        .run(&raw.billing, &layout.transformed_dir(), run_date)
        .map_err(PhaseError::from)?;
    render_transformed(&transformed);
    Ok(0)
}

pub(crate) fn run_merge(args: RunDateArgs) -> Result<i32, AppError> {
    let config = bootstrap()?;
    let layout = infra::layout(&config);
    let run_date = args.run_date();
    let raw = RawArtifacts::locate(&layout.raw_dir(), run_date);
    let transformed = TRANSFORMED.path_in(&layout.transformed_dir(), run_date);

    let report = infra::merger(&config)
        .run(&transformed, &raw.certification, &report_store(&layout), run_date)
        .map_err(PhaseError::from)?;
    render_report(&report);

    let publisher = infra::publisher(&config);
    if publisher.is_enabled() {
        render_sync(&publisher.publish_report(&report.path));
    } else {
        println!("Cloud sync disabled, report kept locally");
    }
    Ok(0)
}

/// Standalone status notification; delivery failures are errors here.
pub(crate) fn run_notify(status: i32) -> Result<i32, AppError> {
    let config = bootstrap()?;
    let status = ReportStatus::from_exit_code(status).unwrap_or(ReportStatus::Failure);
    infra::notifier(&config)?.notify(status)?;
    println!("Sent: {}", status.subject());
    Ok(0)
}

fn render_range(range: &DateRange) {
    println!("Range: {} through {}", range.start(), range.last_day());
}

fn render_sync(sync: &SyncReport) {
    println!(
        "Synced files: {} ({} archived)",
        sync.synced.len(),
        sync.archived.len()
    );
    if !sync.is_clean() {
        for failure in &sync.failures {
            println!("Sync failed: {failure}");
        }
    }
}

fn render_raw(raw: &RawArtifacts) {
    println!(
        "Billing extract: {} ({} rows)",
        raw.billing.display(),
        raw.billing_rows
    );
    println!(
        "Certification extract: {} ({} rows)",
        raw.certification.display(),
        raw.certification_rows
    );
}

fn render_transformed(transformed: &TransformArtifact) {
    let stats = &transformed.outcome.stats;
    println!(
        "Transformed: {} ({} groups)",
        transformed.path.display(),
        transformed.outcome.groups.len()
    );
    println!(
        "Rows: {} read, {} dropped, {} unclassified, {} self-supervision excluded, {} unattributed",
        stats.input_rows,
        stats.dropped_rows,
        stats.unclassified_rows,
        stats.excluded_self_supervision_rows,
        stats.unattributed_supervision_rows
    );
}

fn render_report(report: &MergeArtifact) {
    let stats = &report.outcome.stats;
    println!(
        "Report: {} ({} rows across {} sheets)",
        report.path.display(),
        report.outcome.rows.len(),
        report.sheets.len()
    );
    println!(
        "Compliance: {} below minimum, {} above maximum",
        stats.below_minimum, stats.above_maximum
    );
    for entry in &report.archived {
        println!("Archived: {}", entry.to.display());
    }
}

fn render_status(status: &RunStatus) {
    match status {
        RunStatus::Success(summary) => {
            render_range(&summary.range);
            render_raw(&summary.raw);
            render_transformed(&summary.transformed);
            render_report(&summary.report);
            render_sync(&summary.report_sync);
            render_sync(&summary.raw_sync);
        }
        RunStatus::Failed { phase, error } => {
            println!("Pipeline failed during {}: {error}", phase.label());
        }
    }
}

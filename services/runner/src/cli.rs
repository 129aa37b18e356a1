use crate::jobs;
use chrono::{Duration, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use supervision_report::error::AppError;
use supervision_report::workflows::supervision::extract::since_latest_pull;
use supervision_report::workflows::supervision::DateRange;

#[derive(Parser, Debug)]
#[command(
    name = "supervision-runner",
    about = "Pull, summarize and publish month-to-date supervision hours",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run pull, transform and merge, publish, then notify (default command)
    Run(RangeArgs),
    /// Pull the raw extracts only
    Pull(RangeArgs),
    /// Transform the raw billing extract of a run date
    Transform(RunDateArgs),
    /// Merge certification hours and write the report for a run date
    Merge(RunDateArgs),
    /// Send the status notification for an exit code (0 success, 1 failure)
    Notify {
        #[arg(value_parser = clap::value_parser!(i32).range(0..=1))]
        status: i32,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub(crate) struct RangeArgs {
    /// Inclusive start date (YYYY-MM-DD). Defaults to the first of the month.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Exclusive end date (YYYY-MM-DD). Defaults to today, or tomorrow when
    /// only a start date is given.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) end_date: Option<NaiveDate>,
    /// Date stamped on the artifacts (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) run_date: Option<NaiveDate>,
    /// Start from the newest raw extract instead of the first of the month
    #[arg(long, conflicts_with = "start_date")]
    pub(crate) since_last_pull: bool,
}

impl RangeArgs {
    pub(crate) fn run_date(&self) -> NaiveDate {
        self.run_date.unwrap_or_else(today)
    }

    /// Query window relative to `today`.
    pub(crate) fn resolve(&self, raw_dir: &Path, today: NaiveDate) -> Result<DateRange, AppError> {
        if self.since_last_pull {
            let resumed = since_latest_pull(raw_dir, today)?;
            return match self.end_date {
                Some(end) => Ok(DateRange::new(resumed.start(), end)?),
                None => Ok(resumed),
            };
        }

        let range = match (self.start_date, self.end_date) {
            (None, None) => DateRange::month_to_date(today),
            (Some(start), None) => DateRange::new(start, today + Duration::days(1))?,
            (None, Some(end)) => {
                let start = DateRange::month_to_date(end).start();
                DateRange::new(start, end)?
            }
            (Some(start), Some(end)) => DateRange::new(start, end)?,
        };
        Ok(range)
    }
}

#[derive(Args, Debug, Default, Clone)]
pub(crate) struct RunDateArgs {
    /// Run date of the artifacts to process (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) run_date: Option<NaiveDate>,
}

impl RunDateArgs {
    pub(crate) fn run_date(&self) -> NaiveDate {
        self.run_date.unwrap_or_else(today)
    }
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn run() -> Result<i32, AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Run(RangeArgs::default()));

    match command {
        Command::Run(args) => jobs::run_pipeline(args),
        Command::Pull(args) => jobs::run_pull(args),
        Command::Transform(args) => jobs::run_transform(args),
        Command::Merge(args) => jobs::run_merge(args),
        Command::Notify { status } => jobs::run_notify(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn default_command_is_full_run() {
        let cli = Cli::try_parse_from(["supervision-runner"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_range_options() {
        let cli = Cli::try_parse_from([
            "supervision-runner",
            "run",
            "--start-date",
            "2025-10-01",
            "--end-date",
            "2025-10-15",
            "--run-date",
            "2025-10-15",
        ])
        .expect("parses");
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.start_date, Some(date(2025, 10, 1)));
        assert_eq!(args.end_date, Some(date(2025, 10, 15)));
        assert_eq!(args.run_date(), date(2025, 10, 15));
    }

    #[test]
    fn notify_accepts_only_zero_or_one() {
        assert!(Cli::try_parse_from(["supervision-runner", "notify", "0"]).is_ok());
        assert!(Cli::try_parse_from(["supervision-runner", "notify", "1"]).is_ok());
        assert!(Cli::try_parse_from(["supervision-runner", "notify", "2"]).is_err());
        assert!(Cli::try_parse_from(["supervision-runner", "notify", "yes"]).is_err());
    }

    #[test]
    fn since_last_pull_conflicts_with_start_date() {
        let parsed = Cli::try_parse_from([
            "supervision-runner",
            "pull",
            "--since-last-pull",
            "--start-date",
            "2025-10-01",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn resolves_default_and_explicit_ranges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let today = date(2025, 10, 18);

        let range = RangeArgs::default()
            .resolve(dir.path(), today)
            .expect("month to date");
        assert_eq!(range.start(), date(2025, 10, 1));
        assert_eq!(range.end(), today);

        let start_only = RangeArgs {
            start_date: Some(date(2025, 10, 10)),
            ..RangeArgs::default()
        };
        let range = start_only.resolve(dir.path(), today).expect("start only");
        assert_eq!(range.end(), date(2025, 10, 19));

        let inverted = RangeArgs {
            start_date: Some(date(2025, 10, 10)),
            end_date: Some(date(2025, 10, 9)),
            ..RangeArgs::default()
        };
        assert!(inverted.resolve(dir.path(), today).is_err());
    }

    #[test]
    fn since_last_pull_resumes_from_latest_extract() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("daily_supervision_hours_2025-10-12.csv"),
            "ClientContactId\n",
        )
        .expect("write");

        let args = RangeArgs {
            since_last_pull: true,
            ..RangeArgs::default()
        };
        let range = args.resolve(dir.path(), date(2025, 10, 18)).expect("range");
        assert_eq!(range.start(), date(2025, 10, 12));
        assert_eq!(range.end(), date(2025, 10, 19));
    }
}

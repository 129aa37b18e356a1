mod cli;
mod infra;
mod jobs;

use supervision_report::error::AppError;

/// Parses the command line and returns the process exit code.
pub fn run() -> Result<i32, AppError> {
    cli::run()
}

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::publishing::{NotifyError, SyncError};
use crate::workflows::supervision::{
    ClinicRuleError, DateRangeError, ExtractError, PhaseError, WarehouseError,
};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    ClinicRules(ClinicRuleError),
    Warehouse(WarehouseError),
    Sync(SyncError),
    Notify(NotifyError),
    Range(DateRangeError),
    Workflow(PhaseError),
    Io(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::ClinicRules(err) => write!(f, "clinic rules error: {}", err),
            AppError::Warehouse(err) => write!(f, "warehouse error: {}", err),
            AppError::Sync(err) => write!(f, "sync error: {}", err),
            AppError::Notify(err) => write!(f, "notification error: {}", err),
            AppError::Range(err) => write!(f, "invalid date range: {}", err),
            AppError::Workflow(err) => write!(f, "workflow error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::ClinicRules(err) => Some(err),
            AppError::Warehouse(err) => Some(err),
            AppError::Sync(err) => Some(err),
            AppError::Notify(err) => Some(err),
            AppError::Range(err) => Some(err),
            AppError::Workflow(err) => Some(err),
            AppError::Io(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<ClinicRuleError> for AppError {
    fn from(value: ClinicRuleError) -> Self {
        Self::ClinicRules(value)
    }
}

impl From<WarehouseError> for AppError {
    fn from(value: WarehouseError) -> Self {
        Self::Warehouse(value)
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

impl From<NotifyError> for AppError {
    fn from(value: NotifyError) -> Self {
        Self::Notify(value)
    }
}

impl From<DateRangeError> for AppError {
    fn from(value: DateRangeError) -> Self {
        Self::Range(value)
    }
}

impl From<PhaseError> for AppError {
    fn from(value: PhaseError) -> Self {
        Self::Workflow(value)
    }
}

impl From<ExtractError> for AppError {
    fn from(value: ExtractError) -> Self {
        Self::Workflow(PhaseError::Extract(value))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::workflows::publishing::{SmtpSettings, SyncTargets};
use crate::workflows::supervision::{ComplianceRange, ServiceCodes};

const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Distinguishes runtime behavior for different stages of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the report job.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub report: ReportConfig,
    pub sync: SyncConfig,
    pub notify: NotifyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let standard = ServiceCodes::standard();
        let codes = ServiceCodes {
            direct: code_list("DIRECT_SERVICE_CODES", standard.direct)?,
            supervision: code_list("SUPERVISION_SERVICE_CODES", standard.supervision)?,
            certification: code_list("CERTIFICATION_SERVICE_CODES", standard.certification)?,
        };

        let defaults = ComplianceRange::default();
        let minimum = match optional("SUPERVISION_MIN_PCT") {
            Some(raw) => parse_fraction("SUPERVISION_MIN_PCT", &raw)?,
            None => defaults.minimum,
        };
        let maximum = optional("SUPERVISION_MAX_PCT")
            .map(|raw| parse_fraction("SUPERVISION_MAX_PCT", &raw))
            .transpose()?;
        if let Some(maximum) = maximum {
            if maximum < minimum {
                return Err(ConfigError::InvertedCompliance { minimum, maximum });
            }
        }

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            warehouse: WarehouseConfig {
                url: optional("WAREHOUSE_URL"),
            },
            storage: StorageConfig {
                data_dir: optional("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data")),
            },
            report: ReportConfig {
                codes,
                compliance: ComplianceRange { minimum, maximum },
                clinic_rules_path: optional("CLINIC_RULES_PATH").map(PathBuf::from),
            },
            sync: SyncConfig::load()?,
            notify: NotifyConfig::load()?,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Default)]
pub struct WarehouseConfig {
    pub url: Option<String>,
}

impl WarehouseConfig {
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        self.url
            .as_deref()
            .ok_or(ConfigError::MissingVar("WAREHOUSE_URL"))
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub codes: ServiceCodes,
    pub compliance: ComplianceRange,
    pub clinic_rules_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncBackend {
    GoogleDrive,
    LocalFolder,
    Disabled,
}

impl SyncBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drive" | "google-drive" => Ok(Self::GoogleDrive),
            "local" => Ok(Self::LocalFolder),
            "none" | "off" | "" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownSyncBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub backend: SyncBackend,
    pub service_account_key: Option<PathBuf>,
    pub sync_dir: Option<PathBuf>,
    pub targets: SyncTargets,
}

impl SyncConfig {
    fn load() -> Result<Self, ConfigError> {
        let backend = SyncBackend::parse(&env::var("SYNC_BACKEND").unwrap_or_default())?;
        let service_account_key = optional("GOOGLE_SERVICE_ACCOUNT_KEY").map(PathBuf::from);
        let sync_dir = optional("SYNC_DIR").map(PathBuf::from);

        match backend {
            SyncBackend::GoogleDrive if service_account_key.is_none() => {
                return Err(ConfigError::MissingVar("GOOGLE_SERVICE_ACCOUNT_KEY"));
            }
            SyncBackend::LocalFolder if sync_dir.is_none() => {
                return Err(ConfigError::MissingVar("SYNC_DIR"));
            }
            _ => {}
        }

        Ok(Self {
            backend,
            service_account_key,
            sync_dir,
            targets: SyncTargets {
                raw_folder_id: optional("RAW_FOLDER_ID"),
                report_folder_id: optional("REPORT_FOLDER_ID"),
                report_archive_folder_id: optional("REPORT_ARCHIVE_FOLDER_ID"),
            },
        })
    }
}

/// Mail is sent only when an SMTP account is configured.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub smtp: Option<SmtpSettings>,
}

impl NotifyConfig {
    fn load() -> Result<Self, ConfigError> {
        let Some(username) = optional("SMTP_USERNAME") else {
            return Ok(Self::default());
        };
        let password = optional("SMTP_PASSWORD").ok_or(ConfigError::MissingVar("SMTP_PASSWORD"))?;
        let recipients = optional("NOTIFY_RECIPIENTS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        if recipients.is_empty() {
            return Err(ConfigError::MissingVar("NOTIFY_RECIPIENTS"));
        }

        Ok(Self {
            smtp: Some(SmtpSettings {
                host: optional("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                username,
                password,
                recipients,
            }),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn code_list(key: &'static str, default: Vec<String>) -> Result<Vec<String>, ConfigError> {
    match env::var(key) {
        Ok(raw) => {
            let codes = split_list(&raw);
            if codes.is_empty() {
                Err(ConfigError::EmptyCodeList(key))
            } else {
                Ok(codes)
            }
        }
        Err(_) => Ok(default),
    }
}

/// Accepts a fraction (`0.05`) or a percentage with a trailing `%` (`5%`).
fn parse_fraction(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let invalid = || ConfigError::InvalidPercent {
        key,
        value: raw.to_string(),
    };
    let trimmed = raw.trim();
    let value = match trimmed.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f64>().map_err(|_| invalid())? / 100.0,
        None => trimmed.parse::<f64>().map_err(|_| invalid())?,
    };
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid());
    }
    Ok(value)
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    EmptyCodeList(&'static str),
    InvalidPercent { key: &'static str, value: String },
    InvertedCompliance { minimum: f64, maximum: f64 },
    UnknownSyncBackend(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(key) => write!(f, "{key} must be set"),
            ConfigError::EmptyCodeList(key) => {
                write!(f, "{key} must list at least one service code")
            }
            ConfigError::InvalidPercent { key, value } => write!(
                f,
                "{key} must be a fraction between 0 and 1 or a percentage like 5% (got '{value}')"
            ),
            ConfigError::InvertedCompliance { minimum, maximum } => write!(
                f,
                "SUPERVISION_MAX_PCT ({maximum}) is below SUPERVISION_MIN_PCT ({minimum})"
            ),
            ConfigError::UnknownSyncBackend(value) => {
                write!(f, "SYNC_BACKEND must be drive, local or none (got '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

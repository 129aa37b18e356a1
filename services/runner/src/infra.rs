use chrono::NaiveDate;
use supervision_report::config::{AppConfig, SyncBackend};
use supervision_report::error::AppError;
use supervision_report::workflows::publishing::{
    ArtifactPublisher, CloudSync, GoogleDriveSync, LocalFolderSync, LogNotifier, Notifier,
    SmtpNotifier, SyncError,
};
use supervision_report::workflows::supervision::{
    ClinicRules, Extractor, Merger, SqlxWarehouse, StorageLayout, Transformer,
};
use tracing::{info, warn};

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn layout(config: &AppConfig) -> StorageLayout {
    StorageLayout::new(config.storage.data_dir.clone())
}

pub(crate) fn clinic_rules(config: &AppConfig) -> Result<ClinicRules, AppError> {
    match &config.report.clinic_rules_path {
        Some(path) => {
            let rules = ClinicRules::from_path(path)?;
            info!(path = %path.display(), rules = rules.rules.len(), "loaded clinic rules");
            Ok(rules)
        }
        None => Ok(ClinicRules::standard()),
    }
}

pub(crate) fn transformer(config: &AppConfig) -> Result<Transformer, AppError> {
    Ok(Transformer::new(
        config.report.codes.clone(),
        clinic_rules(config)?,
    ))
}

pub(crate) fn merger(config: &AppConfig) -> Merger {
    Merger::new(config.report.compliance)
}

pub(crate) fn extractor(config: &AppConfig) -> Result<Extractor, AppError> {
    let url = config.warehouse.require_url()?;
    let warehouse = SqlxWarehouse::connect(url, config.report.codes.clone())?;
    Ok(Extractor::new(Box::new(warehouse)))
}

pub(crate) fn cloud_sync(config: &AppConfig) -> Result<Option<Box<dyn CloudSync>>, SyncError> {
    let sync = &config.sync;
    let backend: Box<dyn CloudSync> =
        match (sync.backend, &sync.service_account_key, &sync.sync_dir) {
            (SyncBackend::GoogleDrive, Some(key), _) => {
                Box::new(GoogleDriveSync::from_service_account_key(key)?)
            }
            (SyncBackend::LocalFolder, _, Some(dir)) => Box::new(LocalFolderSync::new(dir.clone())),
            _ => return Ok(None),
        };
    Ok(Some(backend))
}

/// Sync is best effort: a backend that cannot be built disables publishing.
pub(crate) fn publisher(config: &AppConfig) -> ArtifactPublisher {
    match cloud_sync(config) {
        Ok(Some(sync)) => ArtifactPublisher::new(sync, config.sync.targets.clone()),
        Ok(None) => {
            info!("cloud sync disabled");
            ArtifactPublisher::disabled()
        }
        Err(err) => {
            warn!(error = %err, "cloud sync unavailable, artifacts stay local");
            ArtifactPublisher::disabled()
        }
    }
}

/// SMTP when configured, otherwise the log.
pub(crate) fn notifier(config: &AppConfig) -> Result<Box<dyn Notifier>, AppError> {
    let notifier: Box<dyn Notifier> = match &config.notify.smtp {
        Some(settings) => Box::new(SmtpNotifier::new(settings.clone())?),
        None => {
            info!("no smtp account configured, notifications go to the log");
            Box::new(LogNotifier)
        }
    };
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert_eq!(
            parse_date(" 2025-10-18 "),
            Ok(NaiveDate::from_ymd_opt(2025, 10, 18).expect("valid date"))
        );
        assert!(parse_date("10/18/2025").is_err());
    }
}

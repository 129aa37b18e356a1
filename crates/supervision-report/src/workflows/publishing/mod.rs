pub mod drive;
pub mod notify;
pub mod publisher;

pub use drive::{CloudSync, GoogleDriveSync, LocalFolderSync, SyncError, SyncedFile};
pub use notify::{
    notify_quietly, LogNotifier, Notifier, NotifyError, ReportStatus, SmtpNotifier,
    SmtpSettings,
};
pub use publisher::{ArtifactPublisher, SyncReport, SyncTargets};

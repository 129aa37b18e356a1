use std::fmt::Debug;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info, warn};

/// Outcome a run reports to its recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Success,
    Failure,
}

impl ReportStatus {
    /// Maps a process exit code; anything other than 0 or 1 is rejected.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
        }
    }

    pub fn subject(self) -> String {
        format!("Daily Supervision Report: {}", self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid email address '{value}': {source}")]
    Address {
        value: String,
        source: lettre::address::AddressError,
    },
    #[error("no notification recipients configured")]
    NoRecipients,
    #[error("failed to build notification: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

pub trait Notifier: Debug {
    fn notify(&self, status: ReportStatus) -> Result<(), NotifyError>;
}

/// Delivers `status`, logging any failure instead of returning it.
pub fn notify_quietly(notifier: &dyn Notifier, status: ReportStatus) {
    if let Err(err) = notifier.notify(status) {
        warn!(error = %err, status = status.label(), "notification failed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
}

/// Sends a subject-only message through an authenticated STARTTLS relay,
/// from the relay account to each recipient.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&settings.username)?;
        let recipients = settings
            .recipients
            .iter()
            .map(|recipient| parse_mailbox(recipient))
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let transport = SmtpTransport::starttls_relay(&settings.host)?
            .credentials(Credentials::new(settings.username, settings.password))
            .build();

        Ok(Self {
            transport,
            from,
            recipients,
        })
    }

    fn message(&self, status: ReportStatus, to: &Mailbox) -> Result<Message, NotifyError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(status.subject())
            .body(String::new())?)
    }
}

impl Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("from", &self.from.to_string())
            .field("recipients", &self.recipients.len())
            .finish_non_exhaustive()
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, status: ReportStatus) -> Result<(), NotifyError> {
        for recipient in &self.recipients {
            let message = self.message(status, recipient)?;
            self.transport.send(&message)?;
            info!(recipient = %recipient, subject = %status.subject(), "notification sent");
        }
        Ok(())
    }
}

/// Writes the status to the log instead of sending mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, status: ReportStatus) -> Result<(), NotifyError> {
        match status {
            ReportStatus::Success => info!(subject = %status.subject(), "run status"),
            ReportStatus::Failure => error!(subject = %status.subject(), "run status"),
        }
        Ok(())
    }
}

fn parse_mailbox(value: &str) -> Result<Mailbox, NotifyError> {
    value
        .trim()
        .parse::<Mailbox>()
        .map_err(|source| NotifyError::Address {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_follow_status() {
        assert_eq!(
            ReportStatus::Success.subject(),
            "Daily Supervision Report: Success"
        );
        assert_eq!(
            ReportStatus::Failure.subject(),
            "Daily Supervision Report: Failure"
        );
    }

    #[test]
    fn only_zero_and_one_are_statuses() {
        assert_eq!(ReportStatus::from_exit_code(0), Some(ReportStatus::Success));
        assert_eq!(ReportStatus::from_exit_code(1), Some(ReportStatus::Failure));
        assert_eq!(ReportStatus::from_exit_code(2), None);
        assert_eq!(ReportStatus::from_exit_code(-1), None);
    }

    #[test]
    fn smtp_notifier_requires_recipients() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            username: "reports@example.com".to_string(),
            password: "secret".to_string(),
            recipients: Vec::new(),
        };
        assert!(matches!(
            SmtpNotifier::new(settings),
            Err(NotifyError::NoRecipients)
        ));
    }

    #[test]
    fn smtp_notifier_rejects_bad_addresses() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            username: "reports@example.com".to_string(),
            password: "secret".to_string(),
            recipients: vec!["not an address".to_string()],
        };
        assert!(matches!(
            SmtpNotifier::new(settings),
            Err(NotifyError::Address { .. })
        ));
    }

    #[test]
    fn message_has_subject_only() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            username: "reports@example.com".to_string(),
            password: "secret".to_string(),
            recipients: vec!["ops@example.com".to_string()],
        };
        let notifier = SmtpNotifier::new(settings).expect("notifier builds");
        let message = notifier
            .message(ReportStatus::Failure, &notifier.recipients[0])
            .expect("message builds");
        let formatted = String::from_utf8(message.formatted()).expect("utf8");
        assert!(formatted.contains("Subject: Daily Supervision Report: Failure"));
        assert!(formatted.contains("To: ops@example.com"));
    }
}
